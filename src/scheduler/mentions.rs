// Mention polling, the second cooperative task.
//
// The poller owns its own transport instance (never the scheduler's), asks
// it for recent mentions every poll interval, looks up each mention's thread
// context and hands the result to the scheduler as a reply work item over a
// bounded channel. It never posts anything itself.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{Mention, MentionQuery, Transport};

/// Work the poller hands to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Reply {
        mention: Mention,
        /// Root post of the mention's conversation, when it could be found.
        context: Option<String>,
    },
}

/// Capacity of the poller → scheduler channel.
pub const WORK_QUEUE_DEPTH: usize = 32;

/// How many handed-over mention ids the poller remembers. Older ids fall
/// out first; the history's replied_to check still catches them.
pub const SEEN_CAPACITY: usize = 1024;

pub struct MentionPoller {
    source: Box<dyn Transport>,
    tx: mpsc::Sender<WorkItem>,
    interval: Duration,
    window_hours: u32,
    since_id: Option<String>,
    /// Recently handed-over mention ids, oldest at the front.
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    cancel: CancellationToken,
}

impl MentionPoller {
    pub fn new(
        source: Box<dyn Transport>,
        tx: mpsc::Sender<WorkItem>,
        interval: Duration,
        window_hours: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            tx,
            interval,
            window_hours,
            since_id: None,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            cancel,
        }
    }

    /// Fetch once and enqueue every new mention, oldest first.
    ///
    /// Returns how many work items were enqueued, or `None` once the
    /// scheduler has gone away or shutdown was requested while waiting for
    /// queue space.
    pub async fn poll_once(&mut self) -> Option<usize> {
        let query = MentionQuery {
            since_id: self.since_id.clone(),
            window_hours: self.window_hours,
        };

        let mut mentions = self.source.mentions(&query).await;
        mentions.sort_by_key(|m| m.created_at);

        let mut enqueued = 0;
        for mention in mentions {
            self.advance_cursor(&mention.remote_id);
            if !self.remember(&mention.remote_id) {
                debug!(remote_id = %mention.remote_id, "Mention already queued");
                continue;
            }

            let context = self.source.thread_context(&mention).await;
            let item = WorkItem::Reply { mention, context };
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Shutdown requested while the reply queue was full");
                    return None;
                }
                sent = self.tx.send(item) => {
                    if sent.is_err() {
                        debug!("Scheduler stopped accepting work");
                        return None;
                    }
                }
            }
            enqueued += 1;
        }

        if enqueued > 0 {
            info!(enqueued, source = self.source.name(), "Queued mentions for reply");
        }
        Some(enqueued)
    }

    /// Poll until cancelled or the scheduler goes away, then release the
    /// transport.
    pub async fn run(mut self) {
        info!(
            source = self.source.name(),
            every_secs = self.interval.as_secs(),
            "Mention poller started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.poll_once().await.is_none() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.source.close().await;
        info!("Mention poller stopped");
    }

    /// Record `remote_id` as handed over. False if it already was.
    fn remember(&mut self, remote_id: &str) -> bool {
        if !self.seen.insert(remote_id.to_string()) {
            return false;
        }
        self.seen_order.push_back(remote_id.to_string());
        while self.seen_order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn advance_cursor(&mut self, remote_id: &str) {
        let newer = match &self.since_id {
            Some(current) => id_is_newer(remote_id, current),
            None => true,
        };
        if newer {
            self.since_id = Some(remote_id.to_string());
        }
    }
}

/// Post ids are decimal strings that grow over time: longer is newer, and
/// equal lengths compare lexically.
fn id_is_newer(candidate: &str, current: &str) -> bool {
    if !candidate.bytes().all(|b| b.is_ascii_digit()) {
        warn!(candidate, "Non-numeric post id, cursor not advanced");
        return false;
    }
    (candidate.len(), candidate) > (current.len(), current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PostOutcome;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    struct CannedMentions {
        batches: Vec<Vec<Mention>>,
        queries: Arc<Mutex<Vec<MentionQuery>>>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl Transport for CannedMentions {
        fn name(&self) -> &'static str {
            "canned"
        }
        async fn post(&mut self, _text: &str) -> PostOutcome {
            PostOutcome::Failed
        }
        async fn post_reply(&mut self, _text: &str, _target_id: &str) -> PostOutcome {
            PostOutcome::Failed
        }
        async fn mentions(&mut self, query: &MentionQuery) -> Vec<Mention> {
            self.queries.lock().unwrap().push(query.clone());
            if self.batches.is_empty() {
                Vec::new()
            } else {
                self.batches.remove(0)
            }
        }
        async fn thread_context(&mut self, mention: &Mention) -> Option<String> {
            Some(format!("root of {}", mention.remote_id))
        }
        async fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn mention(id: &str, minute: u32) -> Mention {
        Mention {
            remote_id: id.to_string(),
            text: format!("@bruh {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            conversation_id: None,
        }
    }

    #[tokio::test]
    async fn enqueues_oldest_first_with_context_and_advances_cursor() {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let source = CannedMentions {
            batches: vec![
                vec![mention("103", 3), mention("101", 1), mention("99", 0)],
                vec![mention("103", 3), mention("104", 4)],
            ],
            queries: Arc::clone(&queries),
            closed: Arc::new(Mutex::new(false)),
        };
        let (tx, mut rx) = mpsc::channel(WORK_QUEUE_DEPTH);
        let mut poller = MentionPoller::new(
            Box::new(source),
            tx,
            Duration::from_secs(60),
            24,
            CancellationToken::new(),
        );

        assert_eq!(poller.poll_once().await, Some(3));
        assert_eq!(poller.poll_once().await, Some(1));

        let mut ids = Vec::new();
        while let Ok(WorkItem::Reply { mention, context }) = rx.try_recv() {
            assert_eq!(context, Some(format!("root of {}", mention.remote_id)));
            ids.push(mention.remote_id);
        }
        assert_eq!(ids, vec!["99", "101", "103", "104"]);

        let queries = queries.lock().unwrap();
        assert_eq!(queries[0].since_id, None);
        assert_eq!(queries[1].since_id.as_deref(), Some("103"));
        assert_eq!(queries[1].window_hours, 24);
    }

    #[tokio::test]
    async fn stops_when_scheduler_is_gone() {
        let closed = Arc::new(Mutex::new(false));
        let source = CannedMentions {
            batches: vec![vec![mention("1", 0)]],
            queries: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::clone(&closed),
        };
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let poller = MentionPoller::new(
            Box::new(source),
            tx,
            Duration::from_secs(60),
            24,
            CancellationToken::new(),
        );
        poller.run().await;
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_run_and_closes_source() {
        let closed = Arc::new(Mutex::new(false));
        let source = CannedMentions {
            batches: Vec::new(),
            queries: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::clone(&closed),
        };
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let poller = MentionPoller::new(
            Box::new(source),
            tx,
            Duration::from_secs(600),
            24,
            cancel.clone(),
        );

        let task = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        task.await.unwrap();
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unblocks_a_full_queue_and_closes_source() {
        let closed = Arc::new(Mutex::new(false));
        let burst = (0..10).map(|i| mention(&(100 + i).to_string(), i)).collect();
        let source = CannedMentions {
            batches: vec![burst],
            queries: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::clone(&closed),
        };
        // Receiver stays alive but nobody drains it, as when the scheduler
        // has stopped but still holds its end.
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let poller = MentionPoller::new(
            Box::new(source),
            tx,
            Duration::from_secs(900),
            24,
            cancel.clone(),
        );

        let task = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(3600), task)
            .await
            .expect("poller should finish after shutdown")
            .unwrap();
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test]
    async fn seen_ids_are_bounded() {
        let (tx, _rx) = mpsc::channel(1);
        let source = CannedMentions {
            batches: Vec::new(),
            queries: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        };
        let mut poller = MentionPoller::new(
            Box::new(source),
            tx,
            Duration::from_secs(60),
            24,
            CancellationToken::new(),
        );

        for i in 0..SEEN_CAPACITY + 10 {
            assert!(poller.remember(&i.to_string()));
        }
        assert_eq!(poller.seen.len(), SEEN_CAPACITY);
        assert_eq!(poller.seen_order.len(), SEEN_CAPACITY);
        // The oldest ids were forgotten, recent ones are still known.
        assert!(poller.remember("0"));
        assert!(!poller.remember(&(SEEN_CAPACITY + 9).to_string()));
    }

    #[test]
    fn id_ordering() {
        assert!(id_is_newer("100", "99"));
        assert!(id_is_newer("1790000000000000001", "1790000000000000000"));
        assert!(!id_is_newer("98", "99"));
        assert!(!id_is_newer("abc", "1"));
    }
}
