//! `InstanceHandle<S>` (§6): a direct, registry-bypassing reference to a
//! single instance, returned by `Runtime::create` so a caller holding one
//! does not need to pay for a lookup on every interaction.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::Stream;

use crate::activity::AgentActivity;
use crate::error::RuntimeError;
use crate::fanout::{ActivityEvent, FanoutSender};
use crate::ids::AgentRuntimeId;
use crate::mailbox::MailboxSender;
use crate::state::AgentRuntimeState;

#[derive(Clone)]
pub struct InstanceHandle<S> {
    pub(crate) id: AgentRuntimeId,
    pub(crate) mailbox: MailboxSender,
    pub(crate) fanout: Arc<FanoutSender<S>>,
    pub(crate) observe: watch::Receiver<AgentRuntimeState<S>>,
    pub(crate) drain_timeout_override_ms: Arc<std::sync::atomic::AtomicI64>,
}

impl<S> InstanceHandle<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn id(&self) -> &AgentRuntimeId {
        &self.id
    }

    /// `send(id, activity) -> ok | error` (§6), scoped to this instance.
    /// Checked against `status` first so a send against an already-terminated
    /// instance fails with `Terminated` rather than with the mailbox's own
    /// `MailboxClosed`, which is reserved for a send that raced the close.
    pub async fn send(&self, activity: AgentActivity) -> Result<(), RuntimeError> {
        if self.is_terminated() {
            return Err(RuntimeError::Terminated { id: self.id.as_str().to_string() });
        }
        self.mailbox.offer(activity).await
    }

    /// `getState(id) -> AgentRuntimeState<S> | NotFound` (§6). Reading the
    /// handle's `watch` receiver is synchronous and always returns the most
    /// recently published snapshot, never blocking on the driver task.
    pub fn get_state(&self) -> AgentRuntimeState<S> {
        self.observe.borrow().clone()
    }

    /// `subscribe(id) -> Stream<(activity, state)>` (§6, §4.6).
    pub fn subscribe(&self) -> impl Stream<Item = Result<ActivityEvent<S>, RuntimeError>> {
        self.fanout.subscribe()
    }

    /// Closes the instance's mailbox to new offers, starting the
    /// drain-then-stop sequence described in §4.5. `drain_timeout_ms`
    /// overrides, for this call only, the `AgentRuntimeConfig` default the
    /// driver was spawned with (§6's `terminate(id, drainTimeoutMs?)`).
    /// Does not itself wait for the drain to finish; poll `get_state` for
    /// `Terminated`.
    pub fn terminate(&self, drain_timeout_ms: Option<u64>) {
        if let Some(ms) = drain_timeout_ms {
            self.drain_timeout_override_ms.store(ms as i64, Ordering::Release);
        }
        self.mailbox.close();
    }

    pub fn is_terminated(&self) -> bool {
        matches!(
            self.observe.borrow().status,
            crate::state::AgentRuntimeStatus::Terminated
        )
    }
}
