//! `AgentRuntimeConfig` (§4.1, SPEC_FULL §10.3): the in-memory, validated
//! configuration type. Parsing config files and wiring CLI flags stays with
//! the (out-of-scope) CLI collaborator; this crate only owns the validated
//! struct and its defaults.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Default queue capacity when prioritization is disabled.
pub const DEFAULT_MAILBOX_SIZE: usize = 1024;
/// Default per-priority queue capacity when prioritization is enabled.
pub const DEFAULT_PRIORITY_QUEUE_SIZE: usize = 256;
/// Default `offer` wait, in milliseconds, when an activity does not specify
/// its own `metadata.timeout`.
pub const DEFAULT_BACKPRESSURE_TIMEOUT_MS: u64 = 5_000;
/// Default `terminate` drain timeout (§4.5).
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;
/// Default bounded buffer size for each fan-out subscriber (§4.6).
pub const DEFAULT_SUBSCRIBER_BUFFER_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailboxConfig {
    /// Capacity when prioritization is disabled.
    pub size: usize,
    pub enable_prioritization: bool,
    /// Per-priority capacity when prioritization is enabled.
    pub priority_queue_size: usize,
    /// Default `offer` wait, in milliseconds.
    pub backpressure_timeout_ms: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_MAILBOX_SIZE,
            enable_prioritization: false,
            priority_queue_size: DEFAULT_PRIORITY_QUEUE_SIZE,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT_MS,
        }
    }
}

impl MailboxConfig {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.size == 0 {
            return Err(RuntimeError::ConfigurationError {
                reason: "mailbox.size must be greater than 0".to_string(),
            });
        }
        if self.enable_prioritization && self.priority_queue_size == 0 {
            return Err(RuntimeError::ConfigurationError {
                reason: "mailbox.priorityQueueSize must be greater than 0 when prioritization is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRuntimeConfig {
    pub mailbox: MailboxConfig,
    pub drain_timeout_ms: u64,
    pub subscriber_buffer_size: usize,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox: MailboxConfig::default(),
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            subscriber_buffer_size: DEFAULT_SUBSCRIBER_BUFFER_SIZE,
        }
    }
}

impl AgentRuntimeConfig {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.mailbox.validate()?;
        if self.subscriber_buffer_size == 0 {
            return Err(RuntimeError::ConfigurationError {
                reason: "subscriberBufferSize must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        AgentRuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_size_mailbox_is_rejected() {
        let mut config = AgentRuntimeConfig::default();
        config.mailbox.size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_priority_queue_size_rejected_only_when_prioritization_enabled() {
        let mut config = AgentRuntimeConfig::default();
        config.mailbox.priority_queue_size = 0;
        config.mailbox.enable_prioritization = false;
        assert!(config.validate().is_ok());
        config.mailbox.enable_prioritization = true;
        assert!(config.validate().is_err());
    }
}
