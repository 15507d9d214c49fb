//! The per-instance driver loop (§4.3): take -> apply the workflow -> update
//! state and metrics -> publish to subscribers, one activity at a time, on a
//! single dedicated task per instance.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn};

use crate::activity::AgentActivity;
use crate::config::AgentRuntimeConfig;
use crate::fanout::{ActivityEvent, FanoutSender};
use crate::handle::InstanceHandle;
use crate::ids::AgentRuntimeId;
use crate::mailbox::{create_mailbox, MailboxReceiver};
use crate::scheduler::now_epoch_ms;
use crate::state::{AgentRuntimeState, AgentRuntimeStatus, MailboxMetrics, ProcessingMetrics};
use crate::workflow::Workflow;

/// Spawns an instance's driver task and returns a handle to it (§4.3, §4.5,
/// §6).
pub fn spawn_instance<S, W>(
    id: AgentRuntimeId,
    initial_state: S,
    workflow: Arc<W>,
    config: AgentRuntimeConfig,
) -> InstanceHandle<S>
where
    S: Clone + Send + Sync + 'static,
    W: Workflow<S> + 'static,
{
    let (mailbox_tx, mailbox_rx) = create_mailbox(id.as_str(), config.mailbox);
    let fanout = Arc::new(FanoutSender::new(id.as_str(), config.subscriber_buffer_size));

    let initial_snapshot = AgentRuntimeState {
        id: id.as_str().to_string(),
        state: initial_state,
        status: AgentRuntimeStatus::Idle,
        last_updated: now_epoch_ms(),
        error: None,
        processing: ProcessingMetrics::default(),
        mailbox: MailboxMetrics::default(),
    };
    let (observe_tx, observe_rx) = watch::channel(initial_snapshot.clone());
    let drain_timeout_override_ms = Arc::new(AtomicI64::new(-1));

    let handle = InstanceHandle {
        id: id.clone(),
        mailbox: mailbox_tx,
        fanout: fanout.clone(),
        observe: observe_rx,
        drain_timeout_override_ms: drain_timeout_override_ms.clone(),
    };

    info!(agent_runtime_id = %id, "instance-created");

    tokio::spawn(drive(
        id,
        mailbox_rx,
        workflow,
        fanout,
        observe_tx,
        initial_snapshot,
        config.drain_timeout_ms,
        drain_timeout_override_ms,
    ));

    handle
}

async fn drive<S, W>(
    id: AgentRuntimeId,
    mailbox: MailboxReceiver,
    workflow: Arc<W>,
    fanout: Arc<FanoutSender<S>>,
    observe_tx: watch::Sender<AgentRuntimeState<S>>,
    mut snapshot: AgentRuntimeState<S>,
    default_drain_timeout_ms: u64,
    drain_timeout_override_ms: Arc<AtomicI64>,
) where
    S: Clone + Send + Sync + 'static,
    W: Workflow<S> + 'static,
{
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let activity = match drain_deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, mailbox.take()).await {
                    Ok(Some(activity)) => activity,
                    Ok(None) => break,
                    Err(_elapsed) => {
                        warn!(agent_runtime_id = %id, "drain timeout elapsed, forcing stop");
                        break;
                    }
                }
            }
            None => match mailbox.take().await {
                Some(activity) => activity,
                None => break,
            },
        };

        if drain_deadline.is_none() && mailbox.is_closed() {
            let override_ms = drain_timeout_override_ms.load(Ordering::Acquire);
            let drain_timeout_ms = if override_ms >= 0 { override_ms as u64 } else { default_drain_timeout_ms };
            drain_deadline = Some(Instant::now() + std::time::Duration::from_millis(drain_timeout_ms));
        }

        snapshot.status = AgentRuntimeStatus::Processing;
        snapshot.last_updated = now_epoch_ms();
        let _ = observe_tx.send(snapshot.clone());

        let current_state = snapshot.state.clone();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(workflow.apply(&activity, current_state))
            .catch_unwind()
            .await;
        let elapsed_micros = started.elapsed().as_micros() as f64;
        mailbox.record_processing_time(elapsed_micros);

        match outcome {
            Ok(Ok(new_state)) => {
                snapshot.state = new_state;
                snapshot.status = AgentRuntimeStatus::Idle;
                snapshot.error = None;
                snapshot.processing.record_success(elapsed_micros);
            }
            Ok(Err(cause)) => {
                warn!(agent_runtime_id = %id, activity_id = %activity.id, error = %cause, "workflow-error");
                snapshot.status = AgentRuntimeStatus::Error;
                snapshot.error = Some(cause.to_string());
                snapshot.processing.record_failure(elapsed_micros, cause.to_string());
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!(agent_runtime_id = %id, activity_id = %activity.id, panic = %message, "workflow-error");
                snapshot.status = AgentRuntimeStatus::Error;
                snapshot.error = Some(message.clone());
                snapshot.processing.record_failure(elapsed_micros, message);
            }
        }

        snapshot.last_updated = now_epoch_ms();
        snapshot.mailbox = mailbox.metrics();
        let _ = observe_tx.send(snapshot.clone());

        let activity_id = activity.id;
        fanout.publish(ActivityEvent {
            activity,
            state: snapshot.clone(),
        });

        let _span = info_span!(
            "on_activity_processed",
            agent_runtime_id = %id,
            activity_id = %activity_id,
            duration_ms = elapsed_micros / 1_000.0,
        )
        .entered();
        info!("activity-processed");
    }

    snapshot.status = AgentRuntimeStatus::Terminated;
    snapshot.last_updated = now_epoch_ms();
    let _ = observe_tx.send(snapshot);
    fanout.close();
    info!(agent_runtime_id = %id, "instance-terminated");
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "workflow panicked with a non-string payload".to_string()
    }
}
