//! Lifecycle status and the snapshot value returned by `getState` (§3).

use serde::{Deserialize, Serialize};

/// Lifecycle status (§3). `Terminated` is absorbing; `Error` is recovered by
/// the next successful workflow invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AgentRuntimeStatus {
    Idle,
    Processing,
    Error,
    Terminated,
}

/// `processing` (§3): counters and timing for workflow invocations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub processed: u64,
    pub failures: u64,
    /// Exponentially-weighted moving average of workflow invocation time,
    /// in microseconds (§9 leaves mean vs. EWMA to the implementer; this
    /// runtime uses EWMA with `alpha = 0.2`).
    pub avg_processing_time_micros: f64,
    pub last_error: Option<String>,
}

const EWMA_ALPHA: f64 = 0.2;

impl ProcessingMetrics {
    pub(crate) fn record_success(&mut self, elapsed_micros: f64) {
        self.processed += 1;
        self.update_avg(elapsed_micros);
    }

    pub(crate) fn record_failure(&mut self, elapsed_micros: f64, cause: String) {
        self.failures += 1;
        self.last_error = Some(cause);
        self.update_avg(elapsed_micros);
    }

    fn update_avg(&mut self, elapsed_micros: f64) {
        if self.processed + self.failures <= 1 {
            self.avg_processing_time_micros = elapsed_micros;
        } else {
            self.avg_processing_time_micros =
                EWMA_ALPHA * elapsed_micros + (1.0 - EWMA_ALPHA) * self.avg_processing_time_micros;
        }
    }
}

/// `mailbox` (§3): counters surfaced alongside `processing`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MailboxMetrics {
    pub size: usize,
    pub processed: u64,
    pub timeouts: u64,
    pub avg_processing_time_micros: f64,
}

/// `AgentRuntimeState<S>` (§3): an immutable, internally-consistent
/// snapshot. `id`, `state`, `status`, and the counters are all read from the
/// same logical instant. The driver constructs one of these after every
/// processing cycle and publishes it via a `watch` channel (SPEC_FULL §10.5),
/// the same mechanism `quickwit-actors::spawn_builder` uses for
/// `ActorHandle::observe`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRuntimeState<S> {
    pub id: String,
    pub state: S,
    pub status: AgentRuntimeStatus,
    pub last_updated: i64,
    pub error: Option<String>,
    pub processing: ProcessingMetrics,
    pub mailbox: MailboxMetrics,
}
