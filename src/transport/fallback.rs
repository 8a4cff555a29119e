// Primary/secondary transport pair.
//
// Posts go to the primary first. Only a Failed outcome moves on to the
// secondary; a Rejected post would be rejected again by the same platform,
// so it is returned as-is. Reads (mentions, thread context) only use the
// primary: an empty answer is normal there and must not spin up a browser.

use async_trait::async_trait;
use tracing::warn;

use super::{Mention, MentionQuery, PostOutcome, Transport};

pub struct FallbackTransport {
    primary: Box<dyn Transport>,
    secondary: Box<dyn Transport>,
}

impl FallbackTransport {
    pub fn new(primary: Box<dyn Transport>, secondary: Box<dyn Transport>) -> Self {
        Self { primary, secondary }
    }

    fn note_fallback(&self, action: &str) {
        warn!(
            action,
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            "Primary transport failed, falling back"
        );
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn post(&mut self, text: &str) -> PostOutcome {
        match self.primary.post(text).await {
            PostOutcome::Failed => {
                self.note_fallback("post");
                self.secondary.post(text).await
            }
            outcome => outcome,
        }
    }

    async fn post_reply(&mut self, text: &str, target_id: &str) -> PostOutcome {
        match self.primary.post_reply(text, target_id).await {
            PostOutcome::Failed => {
                self.note_fallback("reply");
                self.secondary.post_reply(text, target_id).await
            }
            outcome => outcome,
        }
    }

    async fn mentions(&mut self, query: &MentionQuery) -> Vec<Mention> {
        self.primary.mentions(query).await
    }

    async fn thread_context(&mut self, mention: &Mention) -> Option<String> {
        self.primary.thread_context(mention).await
    }

    async fn close(&mut self) {
        self.primary.close().await;
        self.secondary.close().await;
    }
}
