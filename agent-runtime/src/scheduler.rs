//! Delayed delivery for `metadata.scheduledFor` (§4.2, §9): a min-heap keyed
//! by the due timestamp, drained by a timer task that moves ready
//! activities into the real priority queues, the approach §9 recommends
//! over re-enqueue-on-early-dequeue, and the shape
//! `quickwit-actors::scheduler` is known (from its public surface,
//! `start_scheduler`/`SchedulerClient`) to take internally.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};

use crate::activity::AgentActivity;
use crate::mailbox::MailboxSender;

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

struct DelayedActivity {
    scheduled_for: i64,
    due_at: Instant,
    sequence: u64,
    activity: AgentActivity,
}

impl Eq for DelayedActivity {}
impl PartialEq for DelayedActivity {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.sequence == other.sequence
    }
}
impl Ord for DelayedActivity {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest-due, then
        // earliest-enqueued, activity sorts first.
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for DelayedActivity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Holds activities whose `scheduledFor` has not yet elapsed, and a
/// background task that moves them into the priority mailbox once due.
pub struct DelayScheduler {
    heap: Arc<Mutex<BinaryHeap<DelayedActivity>>>,
    notify: Arc<Notify>,
    sequence: AtomicU64,
}

impl DelayScheduler {
    pub fn new() -> Self {
        Self {
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            notify: Arc::new(Notify::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns `true` if `activity` is due immediately (caller should enqueue
    /// it directly) or `false` if it was held back for later delivery.
    pub async fn offer_or_hold(&self, activity: AgentActivity) -> bool {
        let scheduled_for = match activity.metadata.scheduled_for {
            Some(t) if t > now_epoch_ms() => t,
            _ => return true,
        };
        // `due_at` is derived once here from the wall-clock delta and then
        // tracked purely in tokio's timer clock, so delayed delivery can be
        // driven deterministically under `tokio::time::{pause, advance}`
        // instead of needing the system clock to actually move.
        let due_at = Instant::now() + Duration::from_millis((scheduled_for - now_epoch_ms()).max(0) as u64);
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let mut heap = self.heap.lock().await;
        let wake_timer = heap
            .peek()
            .map(|earliest| due_at < earliest.due_at)
            .unwrap_or(true);
        heap.push(DelayedActivity {
            scheduled_for,
            due_at,
            sequence,
            activity,
        });
        drop(heap);
        if wake_timer {
            self.notify.notify_one();
        }
        false
    }

    /// Runs until `sender` is disconnected, moving due activities into the
    /// mailbox as their `scheduledFor` elapses.
    pub async fn run(self: Arc<Self>, sender: MailboxSender) {
        loop {
            let sleep_duration = {
                let heap = self.heap.lock().await;
                heap.peek().map(|next| next.due_at.saturating_duration_since(Instant::now()))
            };
            match sleep_duration {
                Some(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
            let due = self.drain_due().await;
            for activity in due {
                if sender.redeliver(activity).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn drain_due(&self) -> Vec<AgentActivity> {
        let now = Instant::now();
        let mut heap = self.heap.lock().await;
        let mut due = Vec::new();
        while let Some(next) = heap.peek() {
            if next.due_at > now {
                break;
            }
            due.push(heap.pop().unwrap().activity);
        }
        due
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use crate::config::MailboxConfig;
    use crate::ids::AgentRuntimeId;
    use crate::mailbox::create_mailbox;

    fn activity_due_at(scheduled_for: i64) -> AgentActivity {
        crate::activity::ActivityBuilder::new(
            AgentRuntimeId::new("a").unwrap(),
            ActivityType::Command,
            serde_json::json!(null),
        )
        .scheduled_for(scheduled_for)
        .build()
    }

    #[tokio::test]
    async fn test_activity_due_now_is_not_held() {
        let scheduler = DelayScheduler::new();
        let due_immediately = scheduler.offer_or_hold(activity_due_at(0)).await;
        assert!(due_immediately);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_activity_is_delivered_once_due() {
        // Exercised through the public mailbox API, since `MailboxSender`
        // owns its scheduler internally (§4.2's "offer" contract, not the
        // scheduler's internals, is what callers observe).
        let (tx, rx) = create_mailbox("sched-1", MailboxConfig::default());
        let due_at = now_epoch_ms() + 30_000;
        tx.offer(activity_due_at(due_at)).await.unwrap();

        tokio::time::advance(Duration::from_millis(30_000)).await;

        let activity = tokio::time::timeout(Duration::from_millis(500), rx.take())
            .await
            .expect("activity should be delivered once due")
            .expect("mailbox should not be closed");
        assert_eq!(activity.metadata.scheduled_for, Some(due_at));
    }
}
