// Transports: the concrete mechanisms for posting and reading content.
//
// The official client talks to the platform's REST API. The automation
// client drives a headless browser through the web UI and is the fallback
// when the API is unavailable. Both absorb and classify their own errors and
// hand the scheduler nothing but a PostOutcome.

pub mod automation;
pub mod error;
pub mod fallback;
pub mod official;
pub mod rate_limiter;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Canonical public URL for a post id.
pub fn status_url(remote_id: &str) -> String {
    format!("https://twitter.com/x/status/{remote_id}")
}

/// What a post attempt amounted to, after the transport's own retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The platform confirmed the post. The automation transport cannot
    /// observe the new post's id, so both fields are optional.
    Posted {
        remote_id: Option<String>,
        url: Option<String>,
    },
    /// Failed after retries; a later call may succeed.
    Failed,
    /// Permanently refused (permissions, duplicate content). Retrying the
    /// same text is pointless.
    Rejected,
}

impl PostOutcome {
    pub fn posted(remote_id: impl Into<String>) -> Self {
        let remote_id = remote_id.into();
        PostOutcome::Posted {
            url: Some(status_url(&remote_id)),
            remote_id: Some(remote_id),
        }
    }

    pub fn is_posted(&self) -> bool {
        matches!(self, PostOutcome::Posted { .. })
    }
}

/// An inbound post referencing the agent's account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub remote_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub conversation_id: Option<String>,
}

/// Parameters for a mention fetch. Each transport uses the part it supports:
/// the API filters by id cursor, the scraper by recency window.
#[derive(Debug, Clone, Default)]
pub struct MentionQuery {
    pub since_id: Option<String>,
    pub window_hours: u32,
}

/// A mechanism for publishing and reading posts.
///
/// Methods take `&mut self`: a transport is owned by exactly one task and
/// never shared, so session state needs no locking.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs ("official", "automation").
    fn name(&self) -> &'static str;

    /// Publish an original post.
    async fn post(&mut self, text: &str) -> PostOutcome;

    /// Publish a reply to `target_id`. Single attempt.
    async fn post_reply(&mut self, text: &str, target_id: &str) -> PostOutcome;

    /// Best-effort mention fetch. Errors are logged and yield an empty list.
    async fn mentions(&mut self, query: &MentionQuery) -> Vec<Mention>;

    /// Text of the post that started the mention's conversation, if it can
    /// be found.
    async fn thread_context(&mut self, mention: &Mention) -> Option<String>;

    /// Release any held resources. Idempotent, never fails.
    async fn close(&mut self);
}
