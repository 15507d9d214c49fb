//! Streaming observability (§4.6): every processed activity, together with
//! the resulting state snapshot, is fanned out to any number of
//! subscribers over a bounded `broadcast` channel.
//!
//! `tokio::sync::broadcast` already implements exactly the semantics §4.6
//! asks for: a slow subscriber drops the oldest buffered messages and
//! learns how many it missed via `RecvError::Lagged(n)`. So this module
//! is a thin, typed wrapper rather than a hand-rolled ring buffer.

use std::sync::Mutex;

use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};
use tracing::warn;

use crate::activity::AgentActivity;
use crate::error::RuntimeError;
use crate::state::AgentRuntimeState;

/// One fan-out event (§4.6): the activity just processed, paired with the
/// state snapshot taken immediately afterward.
#[derive(Clone, Debug)]
pub struct ActivityEvent<S> {
    pub activity: AgentActivity,
    pub state: AgentRuntimeState<S>,
}

/// The publishing half, held by the instance driver.
///
/// The broadcast sender sits behind a `Mutex<Option<_>>` rather than being
/// held bare so that `close()` can drop it explicitly (§8's "terminate
/// closes subscriber streams") without requiring every other holder of
/// this `FanoutSender` (e.g. an `InstanceHandle` a caller kept around) to
/// also be dropped first.
pub struct FanoutSender<S> {
    id: String,
    buffer_size: usize,
    inner: Mutex<Option<broadcast::Sender<ActivityEvent<S>>>>,
}

impl<S: Clone> FanoutSender<S> {
    pub fn new(id: impl Into<String>, buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size);
        Self {
            id: id.into(),
            buffer_size,
            inner: Mutex::new(Some(tx)),
        }
    }

    /// Publishes an event. A publish after `close()`, or with zero current
    /// subscribers, is a silent no-op. Fan-out is always best-effort from
    /// the driver's perspective (§4.6: subscribing has no effect on
    /// delivery to the workflow).
    pub fn publish(&self, event: ActivityEvent<S>) {
        if let Some(tx) = self.inner.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(&self) -> impl Stream<Item = Result<ActivityEvent<S>, RuntimeError>>
    where
        S: Send + 'static + Clone,
    {
        let id = self.id.clone();
        let rx = match self.inner.lock().unwrap().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // Subscribing after close: hand back a stream that
                // completes immediately rather than one that silently
                // never produces anything.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        };
        BroadcastStream::new(rx).map(move |result| {
            result.map_err(|BroadcastStreamRecvError::Lagged(dropped)| {
                warn!(mailbox_id = %id, dropped, "subscriber-lagged");
                RuntimeError::SubscriberLagged {
                    id: id.clone(),
                    dropped,
                }
            })
        })
    }

    /// Drops the broadcast sender, completing every live subscription
    /// (§8's "terminate closes subscriber streams"). Called by the driver
    /// once it reaches `Terminated`.
    pub fn close(&self) {
        self.inner.lock().unwrap().take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}
