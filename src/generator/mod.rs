// Content generation: topic or mention in, post-sized text out.
//
// The ContentGenerator trait is the seam the scheduler depends on. The
// production implementation calls an OpenRouter-compatible chat completion
// endpoint; tests swap in canned generators.

pub mod openrouter;
pub mod response;

use async_trait::async_trait;
use thiserror::Error;

use crate::topics::Topic;
use crate::transport::Mention;

/// Hard limit on post length, in characters.
pub const MAX_POST_CHARS: usize = 280;

const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network error talking to the model endpoint: {0}")]
    Network(String),

    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model API error: {0}")]
    Api(String),

    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenerationError::Malformed(err.to_string())
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}

/// Produces the text the agent posts.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// An original post about `topic`, at most MAX_POST_CHARS long.
    async fn generate(&self, topic: &Topic) -> Result<String, GenerationError>;

    /// A reply to `mention`, optionally informed by the conversation's root
    /// post. Same length guarantee.
    async fn generate_reply(
        &self,
        mention: &Mention,
        context: Option<&str>,
    ) -> Result<String, GenerationError>;
}

/// Trim `text` and cut it to the post budget: anything over
/// MAX_POST_CHARS becomes its first 277 characters plus "...".
///
/// Counts chars, not bytes, so accented Spanish and emoji never split.
pub fn fit_post(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_POST_CHARS {
        return text.to_string();
    }
    let keep = MAX_POST_CHARS - ELLIPSIS.len();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(ELLIPSIS);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        assert_eq!(fit_post("  hola  "), "hola");
    }

    #[test]
    fn exactly_280_is_kept() {
        let text = "a".repeat(280);
        assert_eq!(fit_post(&text), text);
    }

    #[test]
    fn long_text_gets_ellipsis() {
        let fitted = fit_post(&"b".repeat(400));
        assert_eq!(fitted.chars().count(), 280);
        assert!(fitted.ends_with("b..."));
        assert_eq!(&fitted[..277], "b".repeat(277));
    }

    #[test]
    fn multibyte_chars_counted_as_one() {
        // 300 chars, 600 bytes
        let text = "ñ".repeat(300);
        let fitted = fit_post(&text);
        assert_eq!(fitted.chars().count(), 280);
        assert!(fitted.starts_with("ññ"));

        let emoji = "🐕".repeat(280);
        assert_eq!(fit_post(&emoji), emoji);
    }
}
