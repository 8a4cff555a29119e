// Browser automation transport: the web UI as a fallback API.
//
// Session lifecycle:
//   Uninitialized → BrowserLaunched → ContextReady → PageReady → LoggedIn
//
// Each step is a fallible, timeout-bounded call; the first failure tears
// down whatever was acquired so far and drops back to Uninitialized, so no
// half-open browser is ever kept around. The session is re-acquired lazily
// the next time an operation needs it.
//
// Scraping the UI is brittle by nature. Everything here is best-effort.

pub mod driver;
pub mod parser;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use self::driver::BrowserDriver;
use super::error::TransportError;
use super::retry::RetryPolicy;
use super::{Mention, MentionQuery, PostOutcome, Transport};

const USERNAME_INPUT: &str = "input[autocomplete='username']";
const PASSWORD_INPUT: &str = "input[type='password']";
/// Only rendered for an authenticated account.
const LOGIN_MARKER: &str = "[data-testid='SideNav_NewTweet_Button']";
const COMPOSE_BUTTON: &str = "[data-testid='SideNav_NewTweet_Button']";
const COMPOSE_TEXTAREA: &str = "[data-testid='tweetTextarea_0']";
const SUBMIT_BUTTON: &str = "[data-testid='tweetButton']";
const REPLY_BUTTON: &str = "[data-testid='reply']";

/// Where the client is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Uninitialized,
    BrowserLaunched,
    ContextReady,
    PageReady,
    LoggedIn,
}

/// Knobs for the automation client. Defaults match the production site.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Bound for any single browser call (navigation is the slow one).
    pub nav_timeout: Duration,
    /// How long a selector may take to appear during a UI step.
    pub element_timeout: Duration,
    /// How long to wait for the post-login marker.
    pub login_wait: Duration,
    /// Attempts per login UI step.
    pub step_attempts: u32,
    /// Pause between login UI step attempts.
    pub step_pause: Duration,
    /// Scroll-and-wait cycles on the mention search page.
    pub scroll_cycles: u32,
    pub scroll_pause: Duration,
    /// Time the compose dialog gets to submit before we call it done.
    pub post_settle: Duration,
    pub screenshot_dir: PathBuf,
}

impl AutomationSettings {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            base_url: "https://twitter.com".to_string(),
            username: username.to_string(),
            password: password.to_string(),
            nav_timeout: Duration::from_secs(60),
            element_timeout: Duration::from_secs(5),
            login_wait: Duration::from_secs(10),
            step_attempts: 3,
            step_pause: Duration::from_secs(2),
            scroll_cycles: 3,
            scroll_pause: Duration::from_secs(3),
            post_settle: Duration::from_secs(2),
            screenshot_dir: PathBuf::from("."),
        }
    }
}

/// Transport that drives the web UI through a browser driver.
pub struct AutomationClient<D: BrowserDriver> {
    driver: D,
    settings: AutomationSettings,
    state: SessionState,
    step_policy: RetryPolicy<TransportError>,
    /// Completed login flows, for logs and diagnostics.
    logins: u32,
}

impl<D: BrowserDriver> AutomationClient<D> {
    pub fn new(driver: D, settings: AutomationSettings) -> Self {
        let pause = settings.step_pause;
        let step_policy =
            RetryPolicy::new(settings.step_attempts).with_backoff(move |_, _| pause);

        Self {
            driver,
            settings,
            state: SessionState::Uninitialized,
            step_policy,
            logins: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn login_count(&self) -> u32 {
        self.logins
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Make sure we hold a logged-in session. A no-op when already logged in.
    pub async fn ensure_session(&mut self) -> Result<(), TransportError> {
        if self.state == SessionState::LoggedIn {
            return Ok(());
        }
        if self.state != SessionState::Uninitialized {
            // Leftovers from an interrupted attempt.
            self.teardown().await;
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "Could not establish browser session");
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<(), TransportError> {
        let limit = self.settings.nav_timeout;

        info!("Launching browser");
        bounded(limit, "launch browser", self.driver.launch()).await?;
        self.state = SessionState::BrowserLaunched;

        bounded(limit, "create browser context", self.driver.open_context()).await?;
        self.state = SessionState::ContextReady;

        bounded(limit, "open page", self.driver.open_page()).await?;
        self.state = SessionState::PageReady;

        self.login().await?;
        self.state = SessionState::LoggedIn;
        self.logins += 1;
        info!(logins = self.logins, "Browser session logged in");
        Ok(())
    }

    async fn login(&mut self) -> Result<(), TransportError> {
        let url = format!("{}/i/flow/login", self.settings.base_url);
        bounded(self.settings.nav_timeout, "open login page", self.driver.goto(&url)).await?;

        debug!("Entering username");
        self.ui_step("enter username", USERNAME_INPUT, &self.settings.username)
            .await?;
        debug!("Entering password");
        self.ui_step("enter password", PASSWORD_INPUT, &self.settings.password)
            .await?;

        let wait = self.settings.login_wait;
        let confirmed = bounded(
            wait + Duration::from_secs(1),
            "confirm login",
            self.driver.wait_for(LOGIN_MARKER, wait),
        )
        .await;

        if let Err(e) = confirmed {
            self.capture("login_error").await;
            return Err(TransportError::Session(format!("login not confirmed: {e}")));
        }
        Ok(())
    }

    /// Fill a field and submit it, retrying the whole step per the step policy.
    async fn ui_step(&self, what: &str, selector: &str, value: &str) -> Result<(), TransportError> {
        let driver = &self.driver;
        let element_timeout = self.settings.element_timeout;
        let limit = self.settings.nav_timeout;

        self.step_policy
            .run(|attempt| {
                if attempt > 1 {
                    warn!(step = what, attempt, "Retrying login step");
                }
                fill_and_submit(driver, selector, value, element_timeout, limit)
            })
            .await
            .map_err(|e| TransportError::Session(format!("{what}: {e}")))
    }

    /// Scrape recent mentions of the account from the live search view.
    pub async fn get_mentions(&mut self, window_hours: u32) -> Vec<Mention> {
        if let Err(e) = self.ensure_session().await {
            warn!(error = %e, "No session, skipping mention scrape");
            return Vec::new();
        }

        match self.scrape_mentions(window_hours).await {
            Ok(mentions) => {
                info!(count = mentions.len(), "Scraped mentions");
                mentions
            }
            Err(e) => {
                warn!(error = %e, "Mention scrape failed");
                self.teardown().await;
                Vec::new()
            }
        }
    }

    async fn scrape_mentions(&mut self, window_hours: u32) -> Result<Vec<Mention>, TransportError> {
        let limit = self.settings.nav_timeout;
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.settings.base_url),
            &[("q", format!("@{}", self.settings.username)), ("f", "live".to_string())],
        )
        .map_err(|e| TransportError::Validation(format!("bad search url: {e}")))?;

        bounded(limit, "open mention search", self.driver.goto(url.as_str())).await?;

        let found = bounded(
            limit,
            "wait for posts",
            self.driver.wait_for(parser::POST_SELECTOR, limit / 2),
        )
        .await;
        if let Err(e) = found {
            // An empty search result renders no posts at all.
            info!(reason = %e, "No posts rendered on mention search");
            return Ok(Vec::new());
        }

        for cycle in 1..=self.settings.scroll_cycles {
            if let Err(e) = bounded(limit, "scroll", self.driver.scroll_to_bottom()).await {
                warn!(cycle, error = %e, "Scroll failed, continuing");
                continue;
            }
            tokio::time::sleep(self.settings.scroll_pause).await;
        }

        let html = bounded(limit, "read page", self.driver.content()).await?;
        let window = chrono::Duration::hours(i64::from(window_hours));
        Ok(parser::parse_mentions(&html, Utc::now(), window))
    }

    /// Root post text of the conversation containing `remote_id`.
    pub async fn get_thread_context(&mut self, remote_id: &str) -> Option<String> {
        if let Err(e) = self.ensure_session().await {
            warn!(error = %e, "No session, skipping thread context");
            return None;
        }

        let limit = self.settings.nav_timeout;
        let url = format!("{}/x/status/{}", self.settings.base_url, remote_id);

        let driver = &self.driver;
        let result = async {
            bounded(limit, "open post", driver.goto(&url)).await?;
            bounded(
                limit,
                "wait for post",
                driver.wait_for(parser::POST_SELECTOR, limit / 2),
            )
            .await?;
            bounded(limit, "read page", driver.content()).await
        }
        .await;

        match result {
            Ok(html) => parser::root_post_text(&html),
            Err(e) => {
                warn!(remote_id, error = %e, "Thread context unavailable, resetting session");
                self.teardown().await;
                None
            }
        }
    }

    async fn compose(&mut self, text: &str, reply_to: Option<&str>) -> Result<(), TransportError> {
        self.ensure_session().await?;

        let limit = self.settings.nav_timeout;
        let element_timeout = self.settings.element_timeout;

        let (page_url, open_button) = match reply_to {
            Some(id) => (
                format!("{}/x/status/{}", self.settings.base_url, id),
                REPLY_BUTTON,
            ),
            None => (format!("{}/home", self.settings.base_url), COMPOSE_BUTTON),
        };

        bounded(limit, "open page", self.driver.goto(&page_url)).await?;
        bounded(limit, "find compose", self.driver.wait_for(open_button, limit / 2)).await?;
        bounded(limit, "open compose", self.driver.click(open_button)).await?;
        bounded(
            limit,
            "find text area",
            self.driver.wait_for(COMPOSE_TEXTAREA, element_timeout),
        )
        .await?;
        bounded(limit, "type post", self.driver.fill(COMPOSE_TEXTAREA, text)).await?;
        bounded(limit, "submit post", self.driver.click(SUBMIT_BUTTON)).await?;

        tokio::time::sleep(self.settings.post_settle).await;
        Ok(())
    }

    async fn publish(&mut self, action: &str, text: &str, reply_to: Option<&str>) -> PostOutcome {
        match self.compose(text, reply_to).await {
            Ok(()) => {
                info!(action, "Published via browser");
                PostOutcome::Posted {
                    remote_id: None,
                    url: None,
                }
            }
            Err(e) => {
                error!(action, error = %e, "Browser publish failed");
                if self.state >= SessionState::PageReady {
                    self.capture(&format!("{action}_error")).await;
                }
                self.teardown().await;
                PostOutcome::Failed
            }
        }
    }

    /// Save a screenshot for diagnosis. Failure to capture is only logged.
    async fn capture(&self, label: &str) {
        let dir = &self.settings.screenshot_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "Cannot create screenshot directory");
            return;
        }
        let path = dir.join(format!("{label}_{}.png", Utc::now().format("%Y%m%dT%H%M%S")));

        match bounded(
            self.settings.nav_timeout,
            "screenshot",
            self.driver.screenshot(&path),
        )
        .await
        {
            Ok(()) => info!(path = %path.display(), "Saved diagnostic screenshot"),
            Err(e) => warn!(error = %e, "Could not capture screenshot"),
        }
    }

    /// Release everything acquired so far, page → context → browser → engine.
    ///
    /// Each step runs even if an earlier one failed. Always ends in
    /// Uninitialized.
    pub async fn teardown(&mut self) {
        if self.state == SessionState::Uninitialized {
            return;
        }
        let limit = self.settings.nav_timeout;
        let state = self.state;

        if state >= SessionState::PageReady {
            log_close("page", bounded(limit, "close page", self.driver.close_page()).await);
        }
        if state >= SessionState::ContextReady {
            log_close(
                "context",
                bounded(limit, "close context", self.driver.close_context()).await,
            );
        }
        log_close(
            "browser",
            bounded(limit, "close browser", self.driver.close_browser()).await,
        );
        log_close(
            "engine",
            bounded(limit, "stop engine", self.driver.stop_engine()).await,
        );

        self.state = SessionState::Uninitialized;
        info!("Browser session closed");
    }
}

#[async_trait]
impl<D: BrowserDriver> Transport for AutomationClient<D> {
    fn name(&self) -> &'static str {
        "automation"
    }

    async fn post(&mut self, text: &str) -> PostOutcome {
        self.publish("post", text, None).await
    }

    async fn post_reply(&mut self, text: &str, target_id: &str) -> PostOutcome {
        self.publish("reply", text, Some(target_id)).await
    }

    async fn mentions(&mut self, query: &MentionQuery) -> Vec<Mention> {
        self.get_mentions(query.window_hours).await
    }

    async fn thread_context(&mut self, mention: &Mention) -> Option<String> {
        self.get_thread_context(&mention.remote_id).await
    }

    async fn close(&mut self) {
        self.teardown().await;
    }
}

async fn fill_and_submit<D: BrowserDriver>(
    driver: &D,
    selector: &str,
    value: &str,
    element_timeout: Duration,
    limit: Duration,
) -> Result<(), TransportError> {
    bounded(limit, "wait for field", driver.wait_for(selector, element_timeout)).await?;
    bounded(limit, "fill field", driver.fill(selector, value)).await?;
    bounded(limit, "submit field", driver.press_enter(selector)).await
}

/// Run a driver call under a time bound, folding both failure modes into a
/// session error.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TransportError::Session(format!("{what}: {e:#}"))),
        Err(_) => Err(TransportError::Session(format!(
            "{what}: timed out after {limit:?}"
        ))),
    }
}

fn log_close(resource: &str, result: Result<(), TransportError>) {
    match result {
        Ok(()) => debug!(resource, "Closed"),
        Err(e) => warn!(resource, error = %e, "Close failed, continuing teardown"),
    }
}
