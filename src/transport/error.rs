// Transport error taxonomy.
//
// Both transports classify every failure into one of these variants before
// deciding whether to retry. The scheduler never sees them (it only gets a
// PostOutcome), but they are what the retry policy and the logs speak.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Network failure, timeout, or an unexpected server status. Retryable.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// HTTP 429. Retryable with a longer backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The platform refused the post (permissions, duplicate content).
    /// Never retried.
    #[error("rejected by platform (duplicate: {duplicate}): {message}")]
    PermanentRejection { message: String, duplicate: bool },

    /// The upstream answered, but not in a shape we understand.
    #[error("malformed response: {0}")]
    Validation(String),

    /// Browser automation failed to log in or navigate. The session is torn
    /// down and re-acquired on next use.
    #[error("session error: {0}")]
    Session(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::TransientNetwork(_) | TransportError::RateLimited(_)
        )
    }

    /// Classify a non-success HTTP status and its body.
    ///
    /// 429 is a rate limit; 403 is a permanent rejection, flagged as duplicate
    /// when the body mentions it; everything else is treated as transient.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => TransportError::RateLimited(format!("{status}: {body}")),
            403 => TransportError::PermanentRejection {
                message: format!("{status}: {body}"),
                duplicate: body.to_lowercase().contains("duplicate"),
            },
            _ => TransportError::TransientNetwork(format!("{status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Validation(err.to_string())
        } else {
            // Timeouts, connect errors and body read failures all count as
            // transient; the next attempt gets a fresh connection.
            TransportError::TransientNetwork(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_429_is_rate_limit() {
        let err = TransportError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, TransportError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn status_403_duplicate_is_flagged() {
        let body = r#"{"detail":"You are not allowed to create a Tweet with duplicate content."}"#;
        let err = TransportError::from_status(StatusCode::FORBIDDEN, body);
        match err {
            TransportError::PermanentRejection { duplicate, .. } => assert!(duplicate),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn status_403_other_is_permanent_not_duplicate() {
        let err = TransportError::from_status(StatusCode::FORBIDDEN, "app lacks write permission");
        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            TransportError::PermanentRejection { duplicate: false, .. }
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = TransportError::from_status(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, TransportError::TransientNetwork(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_and_session_are_not_retryable() {
        assert!(!TransportError::Validation("no data".into()).is_retryable());
        assert!(!TransportError::Session("login".into()).is_retryable());
    }
}
