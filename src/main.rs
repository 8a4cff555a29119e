use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use bruh_bot::config::{Config, MentionSource, TransportKind};
use bruh_bot::generator::openrouter::LlmGenerator;
use bruh_bot::history::{HistoryStore, JsonHistoryStore};
use bruh_bot::scheduler::{
    CycleOutcome, MentionPoller, PostingScheduler, SchedulerHandle, SchedulerSettings,
    WORK_QUEUE_DEPTH,
};
use bruh_bot::topics::TopicCatalog;
use bruh_bot::transport::automation::driver::ChromiumDriver;
use bruh_bot::transport::automation::{AutomationClient, AutomationSettings};
use bruh_bot::transport::fallback::FallbackTransport;
use bruh_bot::transport::official::OfficialClient;
use bruh_bot::transport::{MentionQuery, Transport};

/// bruh-bot: the sassiest Web3 chihuahua on the timeline.
///
/// Generates short themed posts with an LLM and publishes them on a
/// randomized schedule, through the official API or the web UI.
#[derive(Parser)]
#[command(name = "bruh-bot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the posting loop until Ctrl-C
    Run,

    /// Generate and publish a single post, then exit
    PostOnce,

    /// Fetch recent mentions once and print them
    Mentions {
        /// Read from the browser instead of the official API
        #[arg(long)]
        scrape: bool,

        /// How far back to look when scraping, in hours
        #[arg(long)]
        window_hours: Option<u32>,
    },

    /// Drop invalid entries from a history file and fix post URLs
    CleanHistory {
        /// History file to clean (default: BRUH_HISTORY_PATH)
        path: Option<PathBuf>,
    },

    /// Show history stats and the current setup
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bruh_bot=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = Config::load()?;
            config.require_posting()?;

            let history: Arc<dyn HistoryStore> =
                Arc::new(JsonHistoryStore::open(&config.history_path));
            let mut scheduler = build_scheduler(&config, Arc::clone(&history))?;

            let poller = match config.mentions {
                MentionSource::Off => None,
                source => {
                    let (tx, rx) = mpsc::channel(WORK_QUEUE_DEPTH);
                    scheduler = scheduler.with_replies(rx);
                    let poller = MentionPoller::new(
                        mention_transport(&config, source)?,
                        tx,
                        config.mention_poll,
                        config.mention_window_hours,
                        scheduler.handle().cancellation_token(),
                    );
                    Some(tokio::spawn(poller.run()))
                }
            };

            println!("{}", "bruh-bot is waking up *tiembla con emoción*".bold());
            spawn_signal_watcher(scheduler.handle());

            let summary = scheduler.run().await;
            // Release the reply queue so a poller blocked on it sees the
            // channel close.
            drop(scheduler);

            if let Some(poller) = poller {
                if let Err(e) = poller.await {
                    warn!(error = %e, "Mention poller task panicked");
                }
            }

            println!(
                "\nStopped after {} cycles: {} posted, {} replies, {} failures.",
                summary.cycles, summary.posted, summary.replies, summary.failures
            );
        }

        Commands::PostOnce => {
            let config = Config::load()?;
            config.require_posting()?;

            let history: Arc<dyn HistoryStore> =
                Arc::new(JsonHistoryStore::open(&config.history_path));
            let mut scheduler = build_scheduler(&config, history)?;

            let outcome = scheduler.run_once().await;
            scheduler.shutdown().await;

            match outcome {
                CycleOutcome::Posted(record) => {
                    println!("{}", "Posted:".green().bold());
                    println!("  {}", record.content);
                    if let Some(url) = record.url {
                        println!("  {url}");
                    }
                }
                CycleOutcome::Duplicate => {
                    println!("{} generated text was already posted", "Skipped:".yellow());
                }
                CycleOutcome::GenerationFailed => {
                    anyhow::bail!("Content generation failed, see the log above");
                }
                CycleOutcome::NotPosted(outcome) => {
                    anyhow::bail!("Post was not published ({outcome:?})");
                }
            }
        }

        Commands::Mentions {
            scrape,
            window_hours,
        } => {
            let config = Config::load()?;
            let source = if scrape {
                MentionSource::Automation
            } else {
                MentionSource::Official
            };
            let mut transport = mention_transport(&config, source)?;

            let query = MentionQuery {
                since_id: None,
                window_hours: window_hours.unwrap_or(config.mention_window_hours),
            };
            let mentions = transport.mentions(&query).await;
            transport.close().await;

            if mentions.is_empty() {
                println!("No mentions found.");
            }
            for mention in &mentions {
                println!(
                    "{} {} {}",
                    mention.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    mention.remote_id.cyan(),
                    mention.text
                );
            }
        }

        Commands::CleanHistory { path } => {
            let path = match path {
                Some(path) => path,
                None => Config::load()?.history_path,
            };
            let report = bruh_bot::history::clean::clean_history_file(&path)?;
            println!("Cleaned {}", path.display());
            println!("  Kept: {}", report.kept);
            println!("  Dropped: {}", report.dropped);
            println!("  URLs fixed: {}", report.urls_fixed);
        }

        Commands::Status => {
            let config = Config::load()?;
            let history = JsonHistoryStore::open(&config.history_path);
            bruh_bot::status::show(&history, &config).await?;
        }
    }

    Ok(())
}

fn build_scheduler(config: &Config, history: Arc<dyn HistoryStore>) -> Result<PostingScheduler> {
    let generator = LlmGenerator::new(
        &config.openrouter_api_url,
        &config.openrouter_api_key,
        &config.openrouter_model,
    )?;

    let settings = SchedulerSettings {
        interval_min: config.interval_min,
        interval_max: config.interval_max,
        reply_interval: config.reply_interval,
    };

    Ok(PostingScheduler::new(
        posting_transport(config)?,
        Arc::new(generator),
        history,
        TopicCatalog::default(),
        settings,
    ))
}

/// The transport the scheduler posts through, wrapped for failover when
/// BRUH_FALLBACK is on.
fn posting_transport(config: &Config) -> Result<Box<dyn Transport>> {
    match config.transport {
        TransportKind::Automation => Ok(Box::new(automation_client(config))),
        TransportKind::Official if config.fallback => {
            info!("Official API with browser automation fallback");
            Ok(Box::new(FallbackTransport::new(
                Box::new(official_client(config)?),
                Box::new(automation_client(config)),
            )))
        }
        TransportKind::Official => Ok(Box::new(official_client(config)?)),
    }
}

/// A dedicated transport instance for the mention poller. Never shared with
/// the posting side.
fn mention_transport(config: &Config, source: MentionSource) -> Result<Box<dyn Transport>> {
    match source {
        MentionSource::Automation => {
            config.require_automation()?;
            Ok(Box::new(automation_client(config)))
        }
        MentionSource::Official | MentionSource::Off => {
            config.require_official()?;
            Ok(Box::new(official_client(config)?))
        }
    }
}

fn official_client(config: &Config) -> Result<OfficialClient> {
    OfficialClient::new(&config.twitter_api_url, &config.twitter_bearer_token)
}

fn automation_client(config: &Config) -> AutomationClient<ChromiumDriver> {
    let mut settings = AutomationSettings::new(&config.twitter_username, &config.twitter_password);
    settings.screenshot_dir = config.screenshot_dir.clone();
    AutomationClient::new(ChromiumDriver::new(config.headless), settings)
}

/// Turn Ctrl-C (and SIGTERM on Unix) into a scheduler shutdown.
fn spawn_signal_watcher(handle: SchedulerHandle) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, finishing the current step");
        println!("\n{}", "Shutting down... *se acurruca a dormir*".dimmed());
        handle.shutdown();
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    () = async { tokio::signal::ctrl_c().await.ok(); } => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler, Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
