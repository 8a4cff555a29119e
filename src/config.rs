use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Which transport publishes posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Official REST API (default)
    Official,
    /// Browser automation of the web UI
    Automation,
}

/// Where mentions are read from, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionSource {
    Off,
    Official,
    Automation,
}

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// User-context access token for the official API.
    pub twitter_bearer_token: String,
    pub twitter_api_url: String,
    /// Web login, used by the automation transport.
    pub twitter_username: String,
    pub twitter_password: String,
    pub openrouter_api_key: String,
    pub openrouter_api_url: String,
    pub openrouter_model: String,
    pub history_path: PathBuf,
    pub interval_min: Duration,
    pub interval_max: Duration,
    pub reply_interval: Duration,
    pub transport: TransportKind,
    /// Fail over to browser automation when the official API fails.
    pub fallback: bool,
    pub mentions: MentionSource,
    pub mention_poll: Duration,
    pub mention_window_hours: u32,
    /// Where the automation transport drops diagnostic screenshots.
    pub screenshot_dir: PathBuf,
    /// Run the browser without a window (BRUH_HEADLESS=false to watch it).
    pub headless: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default except credentials; call the `require_*`
    /// checks before the operations that need them.
    pub fn load() -> Result<Self> {
        let transport = match env::var("BRUH_TRANSPORT").as_deref() {
            Ok("automation") => TransportKind::Automation,
            Ok("official") | Err(_) => TransportKind::Official,
            Ok(other) => anyhow::bail!(
                "BRUH_TRANSPORT must be \"official\" or \"automation\", got {other:?}"
            ),
        };

        let mentions = match env::var("BRUH_MENTIONS").as_deref() {
            Ok("official") => MentionSource::Official,
            Ok("automation") => MentionSource::Automation,
            Ok("off") | Ok("") | Err(_) => MentionSource::Off,
            Ok(other) => anyhow::bail!(
                "BRUH_MENTIONS must be \"off\", \"official\" or \"automation\", got {other:?}"
            ),
        };

        let config = Self {
            twitter_bearer_token: env::var("TWITTER_BEARER_TOKEN").unwrap_or_default(),
            twitter_api_url: env::var("TWITTER_API_URL").unwrap_or_else(|_| {
                crate::transport::official::DEFAULT_API_URL.to_string()
            }),
            twitter_username: env::var("TWITTER_USERNAME").unwrap_or_default(),
            twitter_password: env::var("TWITTER_PASSWORD").unwrap_or_default(),
            openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            openrouter_api_url: env::var("OPENROUTER_API_URL").unwrap_or_else(|_| {
                crate::generator::openrouter::DEFAULT_API_URL.to_string()
            }),
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| crate::generator::openrouter::DEFAULT_MODEL.to_string()),
            history_path: env::var("BRUH_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/tweets_history.json")),
            interval_min: Duration::from_secs(parse_var("BRUH_INTERVAL_MIN_SECS", 30 * 60)?),
            interval_max: Duration::from_secs(parse_var("BRUH_INTERVAL_MAX_SECS", 60 * 60)?),
            reply_interval: Duration::from_secs(parse_var("BRUH_REPLY_INTERVAL_SECS", 5 * 60)?),
            transport,
            fallback: parse_var("BRUH_FALLBACK", false)?,
            mentions,
            mention_poll: Duration::from_secs(parse_var("BRUH_MENTION_POLL_SECS", 15 * 60)?),
            mention_window_hours: parse_var("BRUH_MENTION_WINDOW_HOURS", 24)?,
            screenshot_dir: env::var("BRUH_SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/screenshots")),
            headless: parse_var("BRUH_HEADLESS", true)?,
        };

        if config.interval_min > config.interval_max {
            anyhow::bail!(
                "BRUH_INTERVAL_MIN_SECS ({}) is larger than BRUH_INTERVAL_MAX_SECS ({})",
                config.interval_min.as_secs(),
                config.interval_max.as_secs()
            );
        }

        Ok(config)
    }

    /// Check that the official API token is configured.
    pub fn require_official(&self) -> Result<()> {
        if self.twitter_bearer_token.is_empty() {
            anyhow::bail!(
                "TWITTER_BEARER_TOKEN not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    /// Check that web login credentials are configured.
    /// Call this before anything that drives the browser.
    pub fn require_automation(&self) -> Result<()> {
        if self.twitter_username.is_empty() || self.twitter_password.is_empty() {
            anyhow::bail!(
                "TWITTER_USERNAME and TWITTER_PASSWORD must both be set for browser automation.\n\
                 Add them to your .env file. See .env.example for details."
            );
        }
        Ok(())
    }

    /// Check that the LLM API key is configured.
    pub fn require_generator(&self) -> Result<()> {
        if self.openrouter_api_key.is_empty() {
            anyhow::bail!(
                "OPENROUTER_API_KEY not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    /// Validate everything the posting loop will touch: the generator, the
    /// chosen transport, the fallback and the mention source.
    pub fn require_posting(&self) -> Result<()> {
        self.require_generator()?;
        match self.transport {
            TransportKind::Official => self.require_official()?,
            TransportKind::Automation => self.require_automation()?,
        }
        if self.fallback && self.transport == TransportKind::Official {
            self.require_automation()?;
        }
        match self.mentions {
            MentionSource::Off => {}
            MentionSource::Official => self.require_official()?,
            MentionSource::Automation => self.require_automation()?,
        }
        Ok(())
    }
}

/// Read an env var and parse it, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}
