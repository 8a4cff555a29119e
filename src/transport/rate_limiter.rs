// Minimum spacing between posts of one kind.
//
// The platform throttles bursts of replies much harder than it throttles
// originals, so replies are spaced by a fixed interval (five minutes by
// default). The limiter is owned by the scheduler's single loop, so it needs
// no interior mutability.

use tokio::time::{Duration, Instant};

/// Enforces a minimum interval between consecutive permits.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Minimum time between permits
    interval: Duration,
    /// When the last permit was handed out
    last_permit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_permit: None,
        }
    }

    /// The instant at which the next permit becomes available.
    ///
    /// `None` when a permit is available right now.
    pub fn ready_at(&self) -> Option<Instant> {
        let last = self.last_permit?;
        let next = last + self.interval;
        (next > Instant::now()).then_some(next)
    }

    /// Record that a permit was used now.
    pub fn mark(&mut self) {
        self.last_permit = Some(Instant::now());
    }

    /// Wait until a permit is available, then take it.
    pub async fn acquire(&mut self) {
        if let Some(ready) = self.ready_at() {
            tokio::time::sleep_until(ready).await;
        }
        self.mark();
    }
}
