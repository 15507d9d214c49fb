//! The prioritized mailbox (§4.2): bounded, priority-aware, with
//! offer-with-timeout, strict-priority take, and scheduled delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use crate::activity::AgentActivity;
use crate::channel_with_priority as pq;
use crate::config::MailboxConfig;
use crate::error::RuntimeError;
use crate::scheduler::DelayScheduler;
use crate::state::MailboxMetrics;

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    timeouts: AtomicU64,
    avg_processing_time_micros_bits: AtomicU64,
}

/// Matches the EWMA alpha `state::ProcessingMetrics` uses, so the mailbox
/// snapshot's latency figure tracks the same recent-weighted average.
const MAILBOX_EWMA_ALPHA: f64 = 0.2;

enum SenderQueues {
    Single(flume::Sender<AgentActivity>),
    Prioritized(pq::Sender<AgentActivity>),
}

enum ReceiverQueues {
    Single(flume::Receiver<AgentActivity>),
    Prioritized(pq::Receiver<AgentActivity>),
}

/// The producer-facing half of a mailbox: cloneable, used by the control
/// plane's `send` and by the scheduler's redelivery path.
#[derive(Clone)]
pub struct MailboxSender {
    id: String,
    queues: Arc<SenderQueues>,
    closed: Arc<AtomicBool>,
    closed_notify: Arc<Notify>,
    counters: Arc<Counters>,
    scheduler: Arc<DelayScheduler>,
    default_timeout: Duration,
}

/// The consumer-facing half: owned exclusively by the instance's driver
/// loop (§4.3's "single-threaded per instance" invariant) so it is not
/// `Clone`.
pub struct MailboxReceiver {
    queues: ReceiverQueues,
    closed: Arc<AtomicBool>,
    closed_notify: Arc<Notify>,
    counters: Arc<Counters>,
}

pub fn create_mailbox(id: impl Into<String>, config: MailboxConfig) -> (MailboxSender, MailboxReceiver) {
    let id = id.into();
    let closed = Arc::new(AtomicBool::new(false));
    let closed_notify = Arc::new(Notify::new());
    let counters = Arc::new(Counters::default());
    let scheduler = Arc::new(DelayScheduler::new());
    let default_timeout = Duration::from_millis(config.backpressure_timeout_ms);

    let (sender_queues, receiver_queues) = if config.enable_prioritization {
        let (tx, rx) = pq::bounded(config.priority_queue_size);
        (SenderQueues::Prioritized(tx), ReceiverQueues::Prioritized(rx))
    } else {
        let (tx, rx) = flume::bounded(config.size);
        (SenderQueues::Single(tx), ReceiverQueues::Single(rx))
    };

    let sender = MailboxSender {
        id: id.clone(),
        queues: Arc::new(sender_queues),
        closed: closed.clone(),
        closed_notify: closed_notify.clone(),
        counters: counters.clone(),
        scheduler: scheduler.clone(),
        default_timeout,
    };
    let receiver = MailboxReceiver {
        queues: receiver_queues,
        closed,
        closed_notify,
        counters,
    };

    tokio::spawn({
        let sender = sender.clone();
        async move { scheduler.run(sender).await }
    });

    (sender, receiver)
}

impl MailboxSender {
    /// `offer(activity) -> ok | Timeout | Closed` (§4.2).
    pub async fn offer(&self, activity: AgentActivity) -> Result<(), RuntimeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RuntimeError::MailboxClosed { id: self.id.clone() });
        }
        if !self.scheduler.offer_or_hold(activity.clone()).await {
            // Held for later delivery; honoring scheduledFor counts as a
            // successful offer (§4.2's "activity is held until then").
            return Ok(());
        }
        let timeout = activity
            .metadata
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        self.send_with_timeout(activity, timeout).await
    }

    async fn send_with_timeout(&self, activity: AgentActivity, timeout: Duration) -> Result<(), RuntimeError> {
        let priority = activity.metadata.priority();
        let send_future = async {
            match self.queues.as_ref() {
                SenderQueues::Single(tx) => tx
                    .send_async(activity)
                    .await
                    .map_err(|_| RuntimeError::MailboxClosed { id: self.id.clone() }),
                SenderQueues::Prioritized(tx) => {
                    tx.send_async(priority, activity)
                        .await
                        .map_err(|_| RuntimeError::MailboxClosed { id: self.id.clone() })
                }
            }
        };
        match tokio::time::timeout(timeout, send_future).await {
            Ok(result) => result,
            Err(_elapsed) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(mailbox_id = %self.id, waited_ms = timeout.as_millis() as u64, "mailbox-offer-timeout");
                Err(RuntimeError::MailboxFull {
                    id: self.id.clone(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Internal redelivery path used by the `DelayScheduler` once a held
    /// activity becomes due. Ignores the `closed` flag: an activity that
    /// was accepted by `offer` before `terminate` is owed delivery during
    /// the drain window even if no new external offers are accepted.
    pub(crate) async fn redeliver(&self, activity: AgentActivity) -> Result<(), ()> {
        let priority = activity.metadata.priority();
        let result = match self.queues.as_ref() {
            SenderQueues::Single(tx) => tx.send_async(activity).await.map_err(|_| ()),
            SenderQueues::Prioritized(tx) => tx.send_async(priority, activity).await.map_err(|_| ()),
        };
        result
    }

    /// Closes the mailbox to new offers and wakes the driver so it notices
    /// termination even while idly waiting on an empty queue. Pending
    /// `offer` calls already in flight will still observe their own timeout
    /// or succeed; subsequent calls fail immediately with `MailboxClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.closed_notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        match self.queues.as_ref() {
            SenderQueues::Single(tx) => tx.len(),
            SenderQueues::Prioritized(tx) => tx.len(),
        }
    }
}

impl MailboxReceiver {
    /// `take() -> activity | Closed` (§4.2). Once the mailbox has been
    /// closed, returns `None` as soon as the queue runs dry, rather than
    /// waiting indefinitely for a sender that will never offer again.
    /// This is what lets the driver loop notice `terminate` while parked
    /// on an empty mailbox.
    pub async fn take(&self) -> Option<AgentActivity> {
        loop {
            let recv = async {
                match &self.queues {
                    ReceiverQueues::Single(rx) => rx.recv_async().await.map_err(|_| ()),
                    ReceiverQueues::Prioritized(rx) => rx.recv().await.map_err(|_| ()),
                }
            };
            tokio::select! {
                biased;
                result = recv => {
                    match result {
                        Ok(activity) => {
                            self.counters.processed.fetch_add(1, Ordering::Relaxed);
                            return Some(activity);
                        }
                        Err(()) => {
                            if self.is_empty() {
                                return None;
                            }
                            // A message may have raced in between the
                            // disconnect check and the receive above; retry
                            // once more before giving up.
                            continue;
                        }
                    }
                }
                _ = self.closed_notify.notified() => {
                    if self.closed.load(Ordering::Acquire) && self.is_empty() {
                        return None;
                    }
                    continue;
                }
            }
        }
    }

    /// Non-blocking variant used while draining under a deadline.
    pub fn try_take(&self) -> Option<AgentActivity> {
        let result = match &self.queues {
            ReceiverQueues::Single(rx) => rx.try_recv().ok(),
            ReceiverQueues::Prioritized(rx) => rx.try_recv().ok(),
        };
        if result.is_some() {
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        match &self.queues {
            ReceiverQueues::Single(rx) => rx.is_empty(),
            ReceiverQueues::Prioritized(rx) => rx.is_empty(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        match &self.queues {
            ReceiverQueues::Single(rx) => rx.len(),
            ReceiverQueues::Prioritized(rx) => rx.len(),
        }
    }

    pub fn metrics(&self) -> MailboxMetrics {
        MailboxMetrics {
            size: self.len(),
            processed: self.counters.processed.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            avg_processing_time_micros: f64::from_bits(
                self.counters.avg_processing_time_micros_bits.load(Ordering::Relaxed),
            ),
        }
    }

    /// Folds one workflow invocation's duration into the mailbox's own
    /// `avgProcessingTime` (§3), called by the driver right after
    /// `Workflow::apply` returns. Kept on the receiver half since only the
    /// driver that owns this mailbox records timing.
    pub(crate) fn record_processing_time(&self, elapsed_micros: f64) {
        let current_bits = self.counters.avg_processing_time_micros_bits.load(Ordering::Relaxed);
        let updated = if current_bits == 0 {
            elapsed_micros
        } else {
            let current = f64::from_bits(current_bits);
            MAILBOX_EWMA_ALPHA * elapsed_micros + (1.0 - MAILBOX_EWMA_ALPHA) * current
        };
        self.counters
            .avg_processing_time_micros_bits
            .store(updated.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityBuilder, ActivityType, Priority};
    use crate::ids::AgentRuntimeId;

    fn activity(priority: Priority) -> AgentActivity {
        ActivityBuilder::new(
            AgentRuntimeId::new("a").unwrap(),
            ActivityType::Command,
            serde_json::json!(null),
        )
        .priority(priority)
        .build()
    }

    #[tokio::test]
    async fn test_offer_then_take_round_trips() {
        let mut config = MailboxConfig::default();
        config.enable_prioritization = true;
        let (tx, rx) = create_mailbox("m1", config);
        tx.offer(activity(Priority::High)).await.unwrap();
        let received = rx.take().await.unwrap();
        assert_eq!(received.metadata.priority(), Priority::High);
        assert_eq!(rx.metrics().processed, 1);
    }

    #[tokio::test]
    async fn test_strict_priority_across_offers() {
        let mut config = MailboxConfig::default();
        config.enable_prioritization = true;
        let (tx, rx) = create_mailbox("m2", config);
        tx.offer(activity(Priority::Low)).await.unwrap();
        tx.offer(activity(Priority::High)).await.unwrap();
        let first = rx.take().await.unwrap();
        assert_eq!(first.metadata.priority(), Priority::High);
    }

    #[tokio::test]
    async fn test_offer_timeout_when_full() {
        let mut config = MailboxConfig::default();
        config.size = 1;
        config.backpressure_timeout_ms = 20;
        let (tx, _rx) = create_mailbox("m3", config);
        tx.offer(activity(Priority::Normal)).await.unwrap();
        let result = tx.offer(activity(Priority::Normal)).await;
        assert!(matches!(result, Err(RuntimeError::MailboxFull { .. })));
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_immediately_when_full() {
        let mut config = MailboxConfig::default();
        config.size = 1;
        let (tx, _rx) = create_mailbox("m4", config);
        tx.offer(activity(Priority::Normal)).await.unwrap();
        let mut second = activity(Priority::Normal);
        second.metadata.timeout_ms = Some(0);
        let started = std::time::Instant::now();
        let result = tx.offer(second).await;
        assert!(matches!(result, Err(RuntimeError::MailboxFull { .. })));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_closed_mailbox_rejects_offers() {
        let config = MailboxConfig::default();
        let (tx, _rx) = create_mailbox("m5", config);
        tx.close();
        let result = tx.offer(activity(Priority::Normal)).await;
        assert!(matches!(result, Err(RuntimeError::MailboxClosed { .. })));
    }

    #[tokio::test]
    async fn test_take_unblocks_with_none_once_closed_and_empty() {
        let config = MailboxConfig::default();
        let (tx, rx) = create_mailbox("m6", config);
        let take = tokio::spawn(async move { rx.take().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.close();
        let result = tokio::time::timeout(Duration::from_millis(200), take)
            .await
            .expect("take should unblock promptly after close")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_record_processing_time_updates_mailbox_metrics() {
        let config = MailboxConfig::default();
        let (_tx, rx) = create_mailbox("m8", config);
        assert_eq!(rx.metrics().avg_processing_time_micros, 0.0);
        rx.record_processing_time(1_000.0);
        assert_eq!(rx.metrics().avg_processing_time_micros, 1_000.0);
        rx.record_processing_time(2_000.0);
        assert!(rx.metrics().avg_processing_time_micros > 1_000.0);
    }

    #[tokio::test]
    async fn test_take_still_drains_queued_activity_after_close() {
        let config = MailboxConfig::default();
        let (tx, rx) = create_mailbox("m7", config);
        tx.offer(activity(Priority::Normal)).await.unwrap();
        tx.close();
        let received = rx.take().await;
        assert!(received.is_some());
        let drained = rx.take().await;
        assert!(drained.is_none());
    }
}
