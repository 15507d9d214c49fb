//! The caller-supplied workflow contract (§4.3, §4.4): a pure function over
//! `(activity, state)` that the runtime never introspects `payload` for.

use async_trait::async_trait;

use crate::activity::AgentActivity;

/// `workflow: (activity, state) -> either<new_state, failure>` (§4.3).
///
/// Implementations must not mutate `state` in place. The runtime owns the
/// slot and passes it by value so the only way to "keep" a field is to
/// return it in the new state, which also keeps workflows trivially
/// testable as pure functions plus whatever side effects they perform
/// through `&self` (e.g. an HTTP client held by the workflow).
#[async_trait]
pub trait Workflow<S>: Send + Sync
where
    S: Send + 'static,
{
    async fn apply(&self, activity: &AgentActivity, state: S) -> anyhow::Result<S>;
}

/// The default identity workflow (§4.4): `(activity, state) -> state`. Used
/// when a caller creates an instance without supplying one, e.g. a pure
/// state-holder actor driven by `STATE_CHANGE` activities whose payload is
/// applied by an external observer rather than the workflow itself.
pub struct IdentityWorkflow;

#[async_trait]
impl<S> Workflow<S> for IdentityWorkflow
where
    S: Send + 'static,
{
    async fn apply(&self, _activity: &AgentActivity, state: S) -> anyhow::Result<S> {
        Ok(state)
    }
}

/// Adapts a plain synchronous closure into a [`Workflow`], for the common
/// case (like `S1` in §8) where the workflow has no side effects of its own.
pub struct FnWorkflow<F>(F);

impl<F> FnWorkflow<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<S, F> Workflow<S> for FnWorkflow<F>
where
    S: Send + 'static,
    F: Fn(&AgentActivity, S) -> anyhow::Result<S> + Send + Sync,
{
    async fn apply(&self, activity: &AgentActivity, state: S) -> anyhow::Result<S> {
        (self.0)(activity, state)
    }
}
