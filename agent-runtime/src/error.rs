//! Error taxonomy (§7). One `thiserror` enum covering every kind the
//! control plane and mailbox can surface, in the same spirit as
//! `quickwit-actors::channel_with_priority::{SendError, RecvError}`: small,
//! typed, matched on by callers rather than stringly inspected.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid agent runtime id: {reason}")]
    InvalidId { reason: String },

    #[error("agent runtime `{id}` already exists")]
    AlreadyExists { id: String },

    #[error("agent runtime `{id}` not found")]
    NotFound { id: String },

    #[error("agent runtime `{id}` is terminated")]
    Terminated { id: String },

    #[error("mailbox of `{id}` is full (waited {waited_ms}ms)")]
    MailboxFull { id: String, waited_ms: u64 },

    #[error("mailbox of `{id}` is closed")]
    MailboxClosed { id: String },

    #[error("workflow for `{id}` failed while processing activity {activity_id}: {cause}")]
    ProcessingError {
        id: String,
        activity_id: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("subscriber for `{id}` lagged and dropped {dropped} activities")]
    SubscriberLagged { id: String, dropped: u64 },

    #[error("invalid agent runtime configuration: {reason}")]
    ConfigurationError { reason: String },
}

impl RuntimeError {
    /// `true` for errors that leave the instance and registry untouched,
    /// i.e. every kind except `ProcessingError`, which is recorded in the
    /// instance's state (§7).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RuntimeError::ProcessingError { .. })
    }
}
