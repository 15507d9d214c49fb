//! Opaque identifiers: [`AgentRuntimeId`] for agent instances, [`ActivityId`]
//! for activity envelopes (§4.1).

use std::fmt;

use crate::error::RuntimeError;

/// Opaque, globally unique (within the process) identifier for an agent
/// instance. Equality is identity on the underlying string: two ids built
/// from the same non-empty string compare equal.
#[derive(
    Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct AgentRuntimeId(String);

impl AgentRuntimeId {
    /// Validates `raw` is non-empty and wraps it. Fails with
    /// [`RuntimeError::InvalidId`] on an empty string.
    pub fn new(raw: impl Into<String>) -> Result<Self, RuntimeError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(RuntimeError::InvalidId {
                reason: "agent runtime id must not be empty".to_string(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentRuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique, monotonic (ULID-backed) identifier minted for every
/// [`crate::activity::AgentActivity`].
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ActivityId(ulid::Ulid);

impl ActivityId {
    pub fn new() -> Self {
        Self(agent_runtime_common::ids::new_monotonic_ulid())
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
