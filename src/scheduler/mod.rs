// The posting scheduler: the agent's single posting loop.
//
// One cycle: pick a topic, generate text, post it, record it, then sleep a
// random interval. Reply work from the mention poller is handled while
// sleeping, through the same transport, so two posts are never in flight at
// once. Cancellation is only observed between cycles and while sleeping; a
// cycle that has started always runs to completion.
//
// State machine (observable through SchedulerHandle):
//   Idle → Generating → Posting → Sleeping → Generating → ...
//   any state → ShuttingDown → Stopped

pub mod mentions;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::generator::ContentGenerator;
use crate::history::{HistoryStore, PostRecord};
use crate::topics::TopicCatalog;
use crate::transport::rate_limiter::RateLimiter;
use crate::transport::{PostOutcome, Transport};

pub use mentions::{MentionPoller, WorkItem, WORK_QUEUE_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Generating,
    Posting,
    Sleeping,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Generating => "generating",
            SchedulerState::Posting => "posting",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::ShuttingDown => "shutting down",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Bounds of the random sleep between cycles, inclusive.
    pub interval_min: Duration,
    pub interval_max: Duration,
    /// Minimum spacing between replies.
    pub reply_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_min: Duration::from_secs(30 * 60),
            interval_max: Duration::from_secs(60 * 60),
            reply_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// What a single cycle amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted(PostRecord),
    /// The generated text was already in the history; nothing was posted.
    Duplicate,
    GenerationFailed,
    NotPosted(PostOutcome),
}

/// Counters for the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u32,
    pub posted: u32,
    pub replies: u32,
    pub failures: u32,
}

/// Cloneable control surface for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop at its next safe checkpoint.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// The token other tasks (the mention poller) should stop on.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve once the scheduler has released everything and stopped.
    pub async fn stopped(&mut self) {
        // An Err means the scheduler was dropped, which is stopped too.
        let _ = self
            .state
            .wait_for(|s| *s == SchedulerState::Stopped)
            .await;
    }
}

enum Wake {
    Cancelled,
    Deadline,
    Reply(Option<WorkItem>),
}

pub struct PostingScheduler {
    transport: Box<dyn Transport>,
    generator: Arc<dyn ContentGenerator>,
    history: Arc<dyn HistoryStore>,
    catalog: TopicCatalog,
    settings: SchedulerSettings,
    replies: Option<mpsc::Receiver<WorkItem>>,
    reply_limiter: RateLimiter,
    cancel: CancellationToken,
    state: watch::Sender<SchedulerState>,
    summary: RunSummary,
}

impl PostingScheduler {
    pub fn new(
        transport: Box<dyn Transport>,
        generator: Arc<dyn ContentGenerator>,
        history: Arc<dyn HistoryStore>,
        catalog: TopicCatalog,
        settings: SchedulerSettings,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        let reply_limiter = RateLimiter::new(settings.reply_interval);
        Self {
            transport,
            generator,
            history,
            catalog,
            settings,
            replies: None,
            reply_limiter,
            cancel: CancellationToken::new(),
            state,
            summary: RunSummary::default(),
        }
    }

    /// Accept reply work from a mention poller.
    pub fn with_replies(mut self, replies: mpsc::Receiver<WorkItem>) -> Self {
        self.replies = Some(replies);
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Loop until cancelled, then run the shutdown sequence.
    pub async fn run(&mut self) -> RunSummary {
        info!(
            transport = self.transport.name(),
            interval_min_secs = self.settings.interval_min.as_secs(),
            interval_max_secs = self.settings.interval_max.as_secs(),
            replies = self.replies.is_some(),
            "Scheduler started"
        );

        while !self.cancel.is_cancelled() {
            self.run_once().await;

            let pause = self.next_interval();
            let wake_at = chrono::Local::now()
                + chrono::Duration::from_std(pause).unwrap_or_else(|_| chrono::Duration::zero());
            info!(
                minutes = %format!("{:.1}", pause.as_secs_f64() / 60.0),
                next_wake = %wake_at.format("%H:%M:%S"),
                "Sleeping until next post"
            );
            self.sleep(pause).await;
        }

        self.shutdown().await;
        self.summary
    }

    /// One generate → post → persist cycle.
    pub async fn run_once(&mut self) -> CycleOutcome {
        self.summary.cycles += 1;
        let topic = self.catalog.choose(&mut rand::rng()).clone();
        info!(topic = %topic.label, style = ?topic.style, "Starting cycle");

        self.set_state(SchedulerState::Generating);
        let text = match self.generator.generate(&topic).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Generation failed, skipping this cycle");
                self.summary.failures += 1;
                return CycleOutcome::GenerationFailed;
            }
        };

        if self.history.contains_content(&text).await {
            warn!(%text, "Generated text was already posted, skipping");
            return CycleOutcome::Duplicate;
        }

        self.set_state(SchedulerState::Posting);
        info!(chars = text.chars().count(), %text, "Posting");

        match self.transport.post(&text).await {
            PostOutcome::Posted { remote_id, url } => {
                let record = PostRecord::original(&text, remote_id, url);
                self.persist(record.clone()).await;
                self.summary.posted += 1;
                info!(
                    remote_id = record.remote_id.as_deref().unwrap_or("unknown"),
                    "Post published"
                );
                CycleOutcome::Posted(record)
            }
            outcome => {
                warn!(?outcome, "Post not published, nothing recorded");
                self.summary.failures += 1;
                CycleOutcome::NotPosted(outcome)
            }
        }
    }

    /// Stop: close the transport and flush the history. Safe to call more
    /// than once.
    pub async fn shutdown(&mut self) {
        if self.state() == SchedulerState::Stopped {
            return;
        }
        self.cancel.cancel();
        self.set_state(SchedulerState::ShuttingDown);
        info!("Shutting down scheduler");

        self.transport.close().await;
        if let Err(e) = self.history.flush().await {
            error!(error = %e, "Failed to flush history on shutdown");
        }

        self.set_state(SchedulerState::Stopped);
        info!(
            cycles = self.summary.cycles,
            posted = self.summary.posted,
            replies = self.summary.replies,
            failures = self.summary.failures,
            "Scheduler stopped"
        );
    }

    fn next_interval(&self) -> Duration {
        let min = self.settings.interval_min.as_secs();
        let max = self.settings.interval_max.as_secs().max(min);
        Duration::from_secs(rand::rng().random_range(min..=max))
    }

    /// Sleep for `pause`, answering replies as they arrive. Replies don't
    /// push the deadline back.
    async fn sleep(&mut self, pause: Duration) {
        self.set_state(SchedulerState::Sleeping);
        let deadline = Instant::now() + pause;

        loop {
            let wake = tokio::select! {
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                item = next_reply(&mut self.replies) => Wake::Reply(item),
            };

            match wake {
                Wake::Cancelled | Wake::Deadline => return,
                Wake::Reply(Some(item)) => {
                    self.handle_reply(item).await;
                    self.set_state(SchedulerState::Sleeping);
                }
                Wake::Reply(None) => {
                    debug!("Mention poller gone, no more replies");
                    self.replies = None;
                }
            }
        }
    }

    /// Generate and publish one reply, respecting the reply spacing.
    pub async fn handle_reply(&mut self, item: WorkItem) {
        let WorkItem::Reply { mention, context } = item;

        if self.history.replied_to(&mention.remote_id).await {
            debug!(remote_id = %mention.remote_id, "Already replied, skipping");
            return;
        }

        if let Some(ready) = self.reply_limiter.ready_at() {
            debug!(
                wait_secs = ready.saturating_duration_since(Instant::now()).as_secs(),
                "Waiting for reply spacing"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(ready) => {}
            }
        }

        self.set_state(SchedulerState::Generating);
        let text = match self
            .generator
            .generate_reply(&mention, context.as_deref())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(remote_id = %mention.remote_id, error = %e, "Reply generation failed");
                self.summary.failures += 1;
                return;
            }
        };

        self.set_state(SchedulerState::Posting);
        let outcome = self.transport.post_reply(&text, &mention.remote_id).await;
        self.reply_limiter.mark();

        match outcome {
            PostOutcome::Posted { remote_id, url } => {
                let record = PostRecord::reply(&text, &mention.remote_id, remote_id, url);
                self.persist(record).await;
                self.summary.replies += 1;
                info!(in_reply_to = %mention.remote_id, "Reply published");
            }
            outcome => {
                warn!(in_reply_to = %mention.remote_id, ?outcome, "Reply not published");
                self.summary.failures += 1;
            }
        }
    }

    async fn persist(&self, record: PostRecord) {
        if let Err(e) = self.history.append(record).await {
            // The post is live either way; only the local log is behind.
            error!(error = %e, "Failed to append to history");
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }
}

async fn next_reply(replies: &mut Option<mpsc::Receiver<WorkItem>>) -> Option<WorkItem> {
    match replies {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_stays_in_bounds() {
        // Only next_interval is exercised; the rest is covered in tests/.
        let settings = SchedulerSettings {
            interval_min: Duration::from_secs(10),
            interval_max: Duration::from_secs(20),
            reply_interval: Duration::ZERO,
        };
        let bounds = settings.interval_min..=settings.interval_max;
        let scheduler = test_scheduler(settings);
        for _ in 0..200 {
            assert!(bounds.contains(&scheduler.next_interval()));
        }
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        let scheduler = test_scheduler(SchedulerSettings {
            interval_min: Duration::from_secs(30),
            interval_max: Duration::from_secs(5),
            reply_interval: Duration::ZERO,
        });
        assert_eq!(scheduler.next_interval(), Duration::from_secs(30));
    }

    fn test_scheduler(settings: SchedulerSettings) -> PostingScheduler {
        use crate::generator::GenerationError;
        use crate::topics::Topic;
        use crate::transport::{Mention, MentionQuery};
        use async_trait::async_trait;

        struct Nop;

        #[async_trait]
        impl Transport for Nop {
            fn name(&self) -> &'static str {
                "nop"
            }
            async fn post(&mut self, _: &str) -> PostOutcome {
                PostOutcome::Failed
            }
            async fn post_reply(&mut self, _: &str, _: &str) -> PostOutcome {
                PostOutcome::Failed
            }
            async fn mentions(&mut self, _: &MentionQuery) -> Vec<Mention> {
                Vec::new()
            }
            async fn thread_context(&mut self, _: &Mention) -> Option<String> {
                None
            }
            async fn close(&mut self) {}
        }

        #[async_trait]
        impl ContentGenerator for Nop {
            async fn generate(&self, _: &Topic) -> Result<String, GenerationError> {
                Err(GenerationError::Api("nop".into()))
            }
            async fn generate_reply(
                &self,
                _: &Mention,
                _: Option<&str>,
            ) -> Result<String, GenerationError> {
                Err(GenerationError::Api("nop".into()))
            }
        }

        let dir = std::env::temp_dir().join("bruh-bot-unused-history.json");
        PostingScheduler::new(
            Box::new(Nop),
            Arc::new(Nop),
            Arc::new(crate::history::JsonHistoryStore::open(dir)),
            TopicCatalog::default(),
            settings,
        )
    }
}
