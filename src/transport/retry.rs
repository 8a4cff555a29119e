// Generic retry policy shared by both transports.
//
// A policy is three decisions: how many attempts, how long to wait after a
// failed attempt, and which errors are worth another try. The operation is
// re-invoked with the 1-based attempt number so callers can log it.
//
// Rate limits get one extra rule: the backoff is also slept after the final
// attempt (a cool-down), so whoever calls next doesn't walk straight back
// into the same limit window.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::error::TransportError;

type BackoffFn<E> = Arc<dyn Fn(u32, &E) -> Duration + Send + Sync>;
type PredicateFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Maximum attempts for an official-API post.
pub const POST_MAX_ATTEMPTS: u32 = 3;

/// Rate-limit backoff multiplier (in backoff units) per attempt number.
pub const RATE_LIMIT_BACKOFF_FACTOR: u32 = 15;

/// Transient-error backoff multiplier (in backoff units) per attempt number.
pub const TRANSIENT_BACKOFF_FACTOR: u32 = 5;

pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: BackoffFn<E>,
    retry_if: PredicateFn<E>,
    cool_down_if: PredicateFn<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            retry_if: Arc::clone(&self.retry_if),
            cool_down_if: Arc::clone(&self.cool_down_if),
        }
    }
}

impl<E: Display> RetryPolicy<E> {
    /// A policy that retries every error up to `max_attempts` with no wait.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(|_, _| Duration::ZERO),
            retry_if: Arc::new(|_| true),
            cool_down_if: Arc::new(|_| false),
        }
    }

    /// Set the wait after a failed attempt (1-based attempt number).
    pub fn with_backoff(mut self, f: impl Fn(u32, &E) -> Duration + Send + Sync + 'static) -> Self {
        self.backoff = Arc::new(f);
        self
    }

    /// Only retry errors matching the predicate; others return immediately.
    pub fn retry_if(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Arc::new(f);
        self
    }

    /// Still sleep the backoff after the final attempt for matching errors.
    pub fn cool_down_if(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.cool_down_if = Arc::new(f);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` under this policy, returning the first success or the
    /// last error.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1u32;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.retry_if)(&err) {
                return Err(err);
            }

            let delay = (self.backoff)(attempt, &err);

            if attempt >= self.max_attempts {
                if (self.cool_down_if)(&err) && !delay.is_zero() {
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Retries exhausted, cooling down before giving up"
                    );
                    tokio::time::sleep(delay).await;
                }
                return Err(err);
            }

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "Attempt {}/{} failed, retrying in {:.1}s",
                attempt,
                self.max_attempts,
                delay.as_secs_f64(),
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// The official client's post policy: 3 attempts, `15 * attempt` units after
/// a rate limit, `5 * attempt` units after any other transient error, and no
/// retry for rejections or malformed responses.
///
/// `unit` is one second in production; tests shrink it.
pub fn post_policy(unit: Duration) -> RetryPolicy<TransportError> {
    RetryPolicy::new(POST_MAX_ATTEMPTS)
        .with_backoff(move |attempt, err: &TransportError| {
            let factor = match err {
                TransportError::RateLimited(_) => RATE_LIMIT_BACKOFF_FACTOR,
                _ => TRANSIENT_BACKOFF_FACTOR,
            };
            unit.saturating_mul(factor * attempt)
        })
        .retry_if(TransportError::is_retryable)
        .cool_down_if(|err| matches!(err, TransportError::RateLimited(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited() -> TransportError {
        TransportError::RateLimited("429 Too Many Requests".into())
    }

    // Note: these tests use start_paused so the 15/30/45-second backoffs
    // complete instantly while still advancing the tokio clock.

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try_without_waiting() {
        let policy = post_policy(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>("1001") }
            })
            .await;

        assert_eq!(result.unwrap(), "1001");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn three_rate_limits_wait_at_least_ninety_seconds() {
        let policy = post_policy(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert!(matches!(result, Err(TransportError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(
            start.elapsed() >= Duration::from_secs(15 + 30 + 45),
            "expected >= 90s of backoff, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_rejection_is_not_retried() {
        let policy = post_policy(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TransportError::PermanentRejection {
                        message: "403 duplicate content".into(),
                        duplicate: true,
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TransportError::PermanentRejection { duplicate: true, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_backs_off_five_seconds_then_succeeds() {
        let policy = post_policy(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TransportError::TransientNetwork("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_do_not_cool_down_after_last_attempt() {
        let policy = post_policy(Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<(), _> = policy
            .run(|_| async { Err(TransportError::TransientNetwork("timeout".into())) })
            .await;

        assert!(result.is_err());
        // 5 * 1 + 5 * 2, nothing after the third attempt
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_numbers_are_one_based() {
        let policy: RetryPolicy<String> = RetryPolicy::new(4);
        let mut seen = Vec::new();

        let _: Result<(), String> = policy
            .run(|attempt| {
                seen.push(attempt);
                async { Err("nope".to_string()) }
            })
            .await;

        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_still_tries_once() {
        let policy: RetryPolicy<String> = RetryPolicy::new(0);
        let calls = AtomicU32::new(0);

        let _: Result<(), String> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_then_success_waits_fifteen_seconds() {
        let policy = post_policy(Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(rate_limited())
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }
}
