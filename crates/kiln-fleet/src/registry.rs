//! Scheduler collaborator traits.
//!
//! The fleet never duplicates scheduler state. Capacity checks read the
//! scheduler's live registry through [`AgentRegistry`], and the retention
//! policy observes and steers individual agents through [`AgentComputer`].
//! Both are narrow capability interfaces implemented by the host
//! integration, which keeps a single source of truth and makes the fleet
//! logic testable against mocks.

use async_trait::async_trait;
use std::time::Duration;

/// Why an agent was taken offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineCause {
    /// Idle threshold exceeded; the agent is being reclaimed.
    Idle,
}

impl std::fmt::Display for OfflineCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfflineCause::Idle => write!(f, "idle timeout"),
        }
    }
}

/// Read-and-steer view of the scheduler's agent registry.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Number of currently registered VM-backed agents.
    ///
    /// This is the single source of truth for capacity checks; the fleet
    /// keeps no local counter.
    async fn count_active(&self) -> usize;

    /// Prompt the scheduler to re-match its queue against remaining
    /// capacity (called while an agent is being drained).
    async fn reevaluate_queue(&self);

    /// Remove an agent's registration.
    async fn deregister(&self, name: &str);
}

/// Live per-agent view and control hooks, as seen by the retention policy.
///
/// Implemented by the host integration around each registered agent; the
/// idle/offline/connecting/accepting flags reflect the scheduler's state,
/// not the fleet's.
#[async_trait]
pub trait AgentComputer: Send + Sync {
    /// Agent node name.
    fn name(&self) -> &str;

    /// True when no task is assigned to the agent.
    fn is_idle(&self) -> bool;

    /// True when the agent is offline (temporarily or permanently).
    fn is_offline(&self) -> bool;

    /// True while the remote-login bootstrap is still in flight.
    fn is_connecting(&self) -> bool;

    /// True while the agent may receive new tasks.
    fn is_accepting_tasks(&self) -> bool;

    /// How long the agent has been idle.
    fn idle_duration(&self) -> Duration;

    /// Mark the agent temporarily offline with a cause.
    fn set_temporarily_offline(&self, cause: OfflineCause);

    /// Flip whether the agent accepts new tasks.
    fn set_accepting_tasks(&self, accepting: bool);

    /// Request VM termination and agent removal.
    ///
    /// Must be best-effort: a stuck cleanup may not block deregistration.
    async fn terminate_node(&self);
}
