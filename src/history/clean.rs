// One-shot history cleanup.
//
// Works on raw JSON values rather than PostRecord so that entries the typed
// loader would reject (missing fields, odd timestamps) can still be
// inspected and dropped, and fields it doesn't know about survive the
// rewrite.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::json::write_records;
use crate::generator::MAX_POST_CHARS;
use crate::transport::status_url;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub kept: usize,
    pub dropped: usize,
    /// Kept entries whose url was (re)derived from their remote id.
    pub urls_fixed: usize,
}

/// Drop over-long, blank or undated entries, normalize every url from its
/// remote id, and rewrite the file in place.
pub fn clean_history_file(path: &Path) -> Result<CleanReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Array(entries) = value else {
        bail!("{} does not contain a JSON array", path.display());
    };

    let (kept, report) = clean_entries(entries);
    write_records(path, &kept)?;

    info!(
        path = %path.display(),
        kept = report.kept,
        dropped = report.dropped,
        urls_fixed = report.urls_fixed,
        "History cleaned"
    );
    Ok(report)
}

fn clean_entries(entries: Vec<Value>) -> (Vec<Value>, CleanReport) {
    let mut report = CleanReport::default();
    let mut kept = Vec::with_capacity(entries.len());

    for mut entry in entries {
        if let Some(reason) = rejection(&entry) {
            debug!(reason, "Dropping history entry");
            report.dropped += 1;
            continue;
        }

        let remote_id = entry
            .get("remote_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if let (Some(id), Some(object)) = (remote_id, entry.as_object_mut()) {
            let url = Value::String(status_url(&id));
            if object.get("url") != Some(&url) {
                object.insert("url".to_string(), url);
                report.urls_fixed += 1;
            }
        }

        kept.push(entry);
        report.kept += 1;
    }

    (kept, report)
}

fn rejection(entry: &Value) -> Option<&'static str> {
    let content = entry.get("content").and_then(Value::as_str).unwrap_or("");
    if content.trim().is_empty() {
        return Some("empty content");
    }
    if content.chars().count() > MAX_POST_CHARS {
        return Some("content over length limit");
    }
    let has_timestamp = entry
        .get("timestamp")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_timestamp {
        return Some("missing timestamp");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_bad_entries_and_fixes_urls() {
        let entries = vec![
            json!({"content":"ok","type":"original","timestamp":"2024-01-01T00:00:00Z","remote_id":"9","url":"https://example.com/wrong"}),
            json!({"content":"   ","type":"original","timestamp":"2024-01-01T00:00:00Z"}),
            json!({"content":"a".repeat(281),"type":"original","timestamp":"2024-01-01T00:00:00Z"}),
            json!({"content":"no time","type":"original"}),
            json!({"content":"ñ".repeat(280),"type":"original","timestamp":"2024-01-01T00:00:00Z","extra":1}),
        ];

        let (kept, report) = clean_entries(entries);
        assert_eq!(
            report,
            CleanReport {
                kept: 2,
                dropped: 3,
                urls_fixed: 1
            }
        );
        assert_eq!(kept[0]["url"], "https://twitter.com/x/status/9");
        assert_eq!(kept[1]["extra"], 1);
    }

    #[test]
    fn correct_url_is_not_counted() {
        let entries = vec![json!({
            "content":"ok","timestamp":"t","remote_id":"9",
            "url":"https://twitter.com/x/status/9"
        })];
        let (_, report) = clean_entries(entries);
        assert_eq!(report.urls_fixed, 0);
    }

    #[test]
    fn non_array_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        std::fs::write(&path, r#"{"content":"x"}"#).unwrap();
        assert!(clean_history_file(&path).is_err());
    }
}
