// Status display: history size, post counts, last activity, configuration.

use anyhow::Result;
use colored::Colorize;

use crate::config::{Config, MentionSource, TransportKind};
use crate::history::{HistoryStore, PostKind};

/// Display agent status to the terminal.
pub async fn show(history: &dyn HistoryStore, config: &Config) -> Result<()> {
    let path = config.history_path.as_path();
    if !path.exists() {
        println!("History: none yet ({})", path.display());
        println!("\nRun `bruh-bot post-once` to publish a first post.");
        print_setup(config);
        return Ok(());
    }

    let file_size = std::fs::metadata(path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("History: {} ({})", path.display(), file_size);

    let records = history.records().await;
    let replies = records.iter().filter(|r| r.kind == PostKind::Reply).count();
    println!(
        "Posts: {} total, {} original, {} replies",
        records.len(),
        records.len() - replies,
        replies
    );

    match records.last() {
        Some(last) => {
            println!(
                "Last post: {} ({})",
                last.timestamp.format("%Y-%m-%d %H:%M UTC"),
                last.kind
            );
            println!("  {}", preview(&last.content, 80).dimmed());
            if let Some(url) = &last.url {
                println!("  {url}");
            }
        }
        None => println!("Last post: never"),
    }

    print_setup(config);
    Ok(())
}

fn print_setup(config: &Config) {
    let transport = match config.transport {
        TransportKind::Official => "official API",
        TransportKind::Automation => "browser automation",
    };
    let fallback = if config.fallback {
        " (falls back to browser automation)"
    } else {
        ""
    };
    println!("\n{}", "Setup".bold());
    println!("  Transport: {transport}{fallback}");

    let mentions = match config.mentions {
        MentionSource::Off => "off".to_string(),
        MentionSource::Official => format!("official API every {}s", config.mention_poll.as_secs()),
        MentionSource::Automation => {
            format!("browser scrape every {}s", config.mention_poll.as_secs())
        }
    };
    println!("  Mentions: {mentions}");
    println!(
        "  Interval: {}-{} min between posts",
        config.interval_min.as_secs() / 60,
        config.interval_max.as_secs() / 60
    );

    let missing: Vec<&str> = [
        ("OPENROUTER_API_KEY", config.require_generator().is_err()),
        ("TWITTER_BEARER_TOKEN", config.require_official().is_err()),
        ("TWITTER_USERNAME/PASSWORD", config.require_automation().is_err()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    if !missing.is_empty() {
        println!("  {} not set: {}", "Warning:".yellow(), missing.join(", "));
    }
}

/// Cut `text` to `max_chars` characters for one-line display.
fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
