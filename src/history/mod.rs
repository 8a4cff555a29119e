// Post history: the append-only log of everything the agent has published.
//
// The scheduler appends a record only after a transport confirmed the post,
// and consults the log to skip duplicate content and mentions it already
// answered. JsonHistoryStore is the production backend; the trait keeps the
// scheduler testable against an in-memory fake.

pub mod clean;
pub mod json;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use json::JsonHistoryStore;

/// Whether a record was an original post or a reply to a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Original,
    Reply,
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostKind::Original => write!(f, "original"),
            PostKind::Reply => write!(f, "reply"),
        }
    }
}

/// One published post, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Id of the mention this reply answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl PostRecord {
    pub fn original(content: &str, remote_id: Option<String>, url: Option<String>) -> Self {
        Self {
            content: content.to_string(),
            kind: PostKind::Original,
            timestamp: Utc::now(),
            remote_id,
            url,
            in_reply_to: None,
        }
    }

    pub fn reply(
        content: &str,
        in_reply_to: &str,
        remote_id: Option<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            content: content.to_string(),
            kind: PostKind::Reply,
            timestamp: Utc::now(),
            remote_id,
            url,
            in_reply_to: Some(in_reply_to.to_string()),
        }
    }
}

/// Durable, append-only post log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Every record, oldest first.
    async fn records(&self) -> Vec<PostRecord>;

    /// Append one record and persist it before returning.
    async fn append(&self, record: PostRecord) -> Result<()>;

    /// Whether an identical text was already published.
    async fn contains_content(&self, content: &str) -> bool;

    /// Whether a reply to the mention `remote_id` was already published.
    async fn replied_to(&self, remote_id: &str) -> bool;

    /// Make sure everything appended so far is on disk.
    async fn flush(&self) -> Result<()>;
}

/// Timestamps are written as RFC 3339. On read, a zone-less ISO 8601 value
/// (as older history files carry) is taken to be UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
