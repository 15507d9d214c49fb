//! Activity envelope and related enums (§3, §4.1).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ActivityId, AgentRuntimeId};

/// `metadata.priority` (§3). Lower numeric value dispatches first; `HIGH`
/// always preempts `NORMAL`, `LOW`, and `BACKGROUND` (§4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
    Background = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// `type` (§3): the kind of envelope this activity represents. The runtime
/// never branches on this value. It is informative only, carried through
/// to the workflow and the fan-out observers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ActivityType {
    Command,
    Event,
    Query,
    Response,
    Error,
    StateChange,
    System,
}

/// The mutable-looking but never-mutated-in-place extension fields (§3).
pub type Extensions = HashMap<String, Value>;

/// `metadata` (§3). Every field is optional at construction time; `newActivity`
/// fills in the documented defaults.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ActivityMetadata {
    pub priority: Option<Priority>,
    pub source_agent_runtime_id: Option<AgentRuntimeId>,
    pub correlation_id: Option<String>,
    /// Epoch milliseconds; the activity is held until this instant (§4.2).
    pub scheduled_for: Option<i64>,
    /// Max offer wait, milliseconds. Defaults to the mailbox's configured
    /// `backpressureTimeout` when absent.
    pub timeout_ms: Option<u64>,
    pub processed: bool,
    pub persisted: bool,
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl ActivityMetadata {
    pub fn priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }
}

/// Immutable activity envelope (§3). Once constructed, an `AgentActivity` is
/// never mutated. The runtime clones the `Arc`-free struct across the
/// mailbox and fan-out paths, matching the "immutable envelope" invariant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentActivity {
    pub id: ActivityId,
    pub agent_runtime_id: AgentRuntimeId,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub payload: Value,
    pub metadata: ActivityMetadata,
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Builds a new [`AgentActivity`], filling in the defaults documented in
/// §4.1: `priority` defaults to `NORMAL`, `timestamp` defaults to "now".
pub struct ActivityBuilder {
    agent_runtime_id: AgentRuntimeId,
    activity_type: ActivityType,
    payload: Value,
    metadata: ActivityMetadata,
    timestamp: Option<i64>,
}

impl ActivityBuilder {
    pub fn new(agent_runtime_id: AgentRuntimeId, activity_type: ActivityType, payload: Value) -> Self {
        Self {
            agent_runtime_id,
            activity_type,
            payload,
            metadata: ActivityMetadata::default(),
            timestamp: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn source(mut self, source: AgentRuntimeId) -> Self {
        self.metadata.source_agent_runtime_id = Some(source);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn scheduled_for(mut self, epoch_ms: i64) -> Self {
        self.metadata.scheduled_for = Some(epoch_ms);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.metadata.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn metadata(mut self, metadata: ActivityMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> AgentActivity {
        AgentActivity {
            id: ActivityId::new(),
            agent_runtime_id: self.agent_runtime_id,
            timestamp: self.timestamp.unwrap_or_else(now_epoch_ms),
            activity_type: self.activity_type,
            payload: self.payload,
            metadata: self.metadata,
        }
    }
}

/// `newActivity(...)` (§4.1): convenience constructor for the common case of
/// sending a plain payload at a given priority.
pub fn new_activity(
    agent_runtime_id: AgentRuntimeId,
    activity_type: ActivityType,
    payload: Value,
    priority: Priority,
) -> AgentActivity {
    ActivityBuilder::new(agent_runtime_id, activity_type, payload)
        .priority(priority)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_is_normal() {
        let activity = new_activity(
            AgentRuntimeId::new("a").unwrap(),
            ActivityType::Command,
            Value::Null,
            Priority::Normal,
        );
        assert_eq!(activity.metadata.priority(), Priority::Normal);
    }

    #[test]
    fn test_builder_defaults_priority_to_normal_when_unset() {
        let activity = ActivityBuilder::new(
            AgentRuntimeId::new("a").unwrap(),
            ActivityType::Event,
            serde_json::json!({"delta": 1}),
        )
        .build();
        assert_eq!(activity.metadata.priority(), Priority::Normal);
    }
}
