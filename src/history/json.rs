// JSON file backend for the post history.
//
// The whole history lives in memory and the whole file is rewritten on every
// append: write to a sibling temp file, then rename over the original, so a
// crash mid-write leaves the previous version intact. Histories are small
// (a few posts an hour) so the full rewrite is fine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{HistoryStore, PostRecord};

pub struct JsonHistoryStore {
    path: PathBuf,
    records: Mutex<Vec<PostRecord>>,
}

impl JsonHistoryStore {
    /// Open the history at `path`. A missing file is an empty history. An
    /// unreadable one is moved aside to `<name>.corrupt` (so the next append
    /// doesn't overwrite it) and also treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load(&path);
        info!(path = %path.display(), records = records.len(), "Loaded post history");
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn records(&self) -> Vec<PostRecord> {
        self.records.lock().await.clone()
    }

    async fn append(&self, record: PostRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        records.push(record);
        if let Err(e) = write_records(&self.path, &records) {
            // Keep memory and disk in step: the record is not durable, so it
            // is not part of the history either.
            records.pop();
            return Err(e);
        }
        debug!(total = records.len(), "History appended");
        Ok(())
    }

    async fn contains_content(&self, content: &str) -> bool {
        self.records
            .lock()
            .await
            .iter()
            .any(|r| r.content == content)
    }

    async fn replied_to(&self, remote_id: &str) -> bool {
        self.records
            .lock()
            .await
            .iter()
            .any(|r| r.in_reply_to.as_deref() == Some(remote_id))
    }

    async fn flush(&self) -> Result<()> {
        let records = self.records.lock().await;
        if records.is_empty() && !self.path.exists() {
            return Ok(());
        }
        write_records(&self.path, &records)
    }
}

fn load(path: &Path) -> Vec<PostRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read history, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<PostRecord>>(&raw) {
        Ok(records) => records,
        Err(e) => {
            let aside = sidecar(path, "corrupt");
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "History file is not valid, starting empty"
            );
            if let Err(e) = std::fs::rename(path, &aside) {
                warn!(error = %e, "Could not move unreadable history aside");
            }
            Vec::new()
        }
    }
}

/// Serialize `records` to `path` via a temp file and rename.
pub(crate) fn write_records<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(records).context("Failed to serialize history")?;
    let tmp = sidecar(path, "tmp");

    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
