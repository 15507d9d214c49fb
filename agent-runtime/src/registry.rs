//! `Runtime<S>` (§5, §6): the control-plane API. Holds every instance of a
//! given state shape `S` behind a registry, so callers who do not want to
//! carry an `InstanceHandle` around can address instances by id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_stream::Stream;

use crate::activity::AgentActivity;
use crate::config::AgentRuntimeConfig;
use crate::error::RuntimeError;
use crate::fanout::ActivityEvent;
use crate::handle::InstanceHandle;
use crate::ids::AgentRuntimeId;
use crate::instance::spawn_instance;
use crate::state::AgentRuntimeState;
use crate::workflow::Workflow;

/// The control plane for every instance of a given state shape `S` (§5).
///
/// Multiple `Runtime<S>` values may coexist within a process, one per state
/// shape, since an activity's `payload` is a dynamic `serde_json::Value`
/// but the workflow state it drives is statically typed per runtime.
pub struct Runtime<S> {
    instances: RwLock<HashMap<AgentRuntimeId, InstanceHandle<S>>>,
    config: AgentRuntimeConfig,
}

impl<S> Runtime<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(config: AgentRuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self {
            instances: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// `create(id, initialState, workflow) -> InstanceHandle<S> | AlreadyExists` (§6).
    pub async fn create<W>(
        &self,
        id: AgentRuntimeId,
        initial_state: S,
        workflow: W,
    ) -> Result<InstanceHandle<S>, RuntimeError>
    where
        W: Workflow<S> + 'static,
    {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) {
            return Err(RuntimeError::AlreadyExists { id: id.as_str().to_string() });
        }
        let handle = spawn_instance(id.clone(), initial_state, Arc::new(workflow), self.config.clone());
        instances.insert(id, handle.clone());
        Ok(handle)
    }

    /// `send(id, activity) -> ok | NotFound | Timeout | Closed` (§6).
    pub async fn send(&self, id: &AgentRuntimeId, activity: AgentActivity) -> Result<(), RuntimeError> {
        let handle = self.lookup(id).await?;
        handle.send(activity).await
    }

    /// `getState(id) -> AgentRuntimeState<S> | NotFound` (§6).
    pub async fn get_state(&self, id: &AgentRuntimeId) -> Result<AgentRuntimeState<S>, RuntimeError> {
        let handle = self.lookup(id).await?;
        Ok(handle.get_state())
    }

    /// `subscribe(id) -> Stream<(activity, state)> | NotFound` (§6, §4.6).
    pub async fn subscribe(
        &self,
        id: &AgentRuntimeId,
    ) -> Result<impl Stream<Item = Result<ActivityEvent<S>, RuntimeError>>, RuntimeError> {
        let handle = self.lookup(id).await?;
        Ok(handle.subscribe())
    }

    /// `terminate(id, drainTimeoutMs?) -> ok | NotFound` (§6, §4.5). Removes
    /// the instance from the registry immediately; the driver task itself
    /// continues draining in the background until it reaches `Terminated`.
    /// `drain_timeout_ms`, when given, overrides the config-wide
    /// `drain_timeout_ms` for this instance's stop sequence only.
    pub async fn terminate(&self, id: &AgentRuntimeId, drain_timeout_ms: Option<u64>) -> Result<(), RuntimeError> {
        let mut instances = self.instances.write().await;
        match instances.remove(id) {
            Some(handle) => {
                handle.terminate(drain_timeout_ms);
                Ok(())
            }
            None => Err(RuntimeError::NotFound { id: id.as_str().to_string() }),
        }
    }

    pub async fn list_ids(&self) -> Vec<AgentRuntimeId> {
        self.instances.read().await.keys().cloned().collect()
    }

    async fn lookup(&self, id: &AgentRuntimeId) -> Result<InstanceHandle<S>, RuntimeError> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound { id: id.as_str().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{new_activity, ActivityType, Priority};
    use crate::workflow::FnWorkflow;
    use tokio_stream::StreamExt;

    fn counter_workflow() -> FnWorkflow<impl Fn(&AgentActivity, i64) -> anyhow::Result<i64>> {
        FnWorkflow::new(|activity: &AgentActivity, state: i64| {
            let delta = activity.payload["delta"].as_i64().unwrap_or(0);
            Ok(state + delta)
        })
    }

    #[tokio::test]
    async fn test_create_then_send_then_get_state() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("counter-1").unwrap();
        runtime.create(id.clone(), 0, counter_workflow()).await.unwrap();

        runtime
            .send(
                &id,
                new_activity(id.clone(), ActivityType::Command, serde_json::json!({"delta": 3}), Priority::Normal),
            )
            .await
            .unwrap();

        loop {
            let state = runtime.get_state(&id).await.unwrap();
            if state.state == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("dup").unwrap();
        runtime.create(id.clone(), 0, counter_workflow()).await.unwrap();
        let result = runtime.create(id.clone(), 0, counter_workflow()).await;
        assert!(matches!(result, Err(RuntimeError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_operations_on_unknown_id_are_not_found() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("ghost").unwrap();
        assert!(matches!(runtime.get_state(&id).await, Err(RuntimeError::NotFound { .. })));
        assert!(matches!(runtime.terminate(&id, None).await, Err(RuntimeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_subscribe_observes_published_events() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("observed").unwrap();
        runtime.create(id.clone(), 0, counter_workflow()).await.unwrap();
        let mut stream = Box::pin(runtime.subscribe(&id).await.unwrap());

        runtime
            .send(
                &id,
                new_activity(id.clone(), ActivityType::Command, serde_json::json!({"delta": 1}), Priority::Normal),
            )
            .await
            .unwrap();

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.state.state, 1);
    }

    #[tokio::test]
    async fn test_terminate_removes_from_registry_and_drains() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("term").unwrap();
        let handle = runtime.create(id.clone(), 0, counter_workflow()).await.unwrap();
        runtime.terminate(&id, None).await.unwrap();
        assert!(matches!(runtime.get_state(&id).await, Err(RuntimeError::NotFound { .. })));

        loop {
            if handle.get_state().status == crate::state::AgentRuntimeStatus::Terminated {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_send_after_terminated_status_settles_returns_terminated_error() {
        let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default()).unwrap();
        let id = AgentRuntimeId::new("late-sender").unwrap();
        let handle = runtime.create(id.clone(), 0, counter_workflow()).await.unwrap();
        runtime.terminate(&id, None).await.unwrap();

        loop {
            if handle.get_state().status == crate::state::AgentRuntimeStatus::Terminated {
                break;
            }
            tokio::task::yield_now().await;
        }

        let result = handle
            .send(new_activity(id, ActivityType::Command, serde_json::json!(null), Priority::Normal))
            .await;
        assert!(matches!(result, Err(RuntimeError::Terminated { .. })));
    }
}
