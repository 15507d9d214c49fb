//! An in-process, message-driven runtime for long-lived, stateful agent
//! instances (§1, §2).
//!
//! Each instance owns a prioritized mailbox, a single-threaded driver that
//! applies a caller-supplied [`workflow::Workflow`] to incoming
//! [`activity::AgentActivity`] values, and a `watch`-backed state snapshot
//! observers can read without contending with the driver. A [`registry::Runtime`]
//! ties many instances of the same state shape together behind the
//! id-addressed control plane described in §6.
//!
//! ```no_run
//! use agent_runtime::{activity::{new_activity, ActivityType, Priority}, config::AgentRuntimeConfig, ids::AgentRuntimeId, registry::Runtime, workflow::FnWorkflow};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let runtime = Runtime::<i64>::new(AgentRuntimeConfig::default())?;
//! let id = AgentRuntimeId::new("counter-1")?;
//! let workflow = FnWorkflow::new(|activity, state: i64| {
//!     Ok(state + activity.payload["delta"].as_i64().unwrap_or(0))
//! });
//! let handle = runtime.create(id.clone(), 0, workflow).await?;
//! handle
//!     .send(new_activity(id, ActivityType::Command, serde_json::json!({"delta": 1}), Priority::Normal))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod channel_with_priority;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handle;
pub mod ids;
pub mod instance;
pub mod mailbox;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod workflow;

pub use error::RuntimeError;
pub use handle::InstanceHandle;
pub use registry::Runtime;
