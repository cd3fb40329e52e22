//! Idle-based reclamation of VM-backed agents.

use crate::error::FleetError;
use crate::registry::{AgentComputer, AgentRegistry, OfflineCause};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fixed advisory delay returned to the scheduler after every check,
/// regardless of remaining idle budget.
const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Per-agent idle-reclamation policy, evaluated once per scheduling tick.
///
/// The threshold is kept as the raw configured string; a value that is not
/// a positive integer of minutes disables reclamation for this agent (one
/// warning, never an error to the tick).
pub struct RetentionPolicy {
    idle_timeout_minutes: String,
    threshold_warned: AtomicBool,
}

impl RetentionPolicy {
    /// Create a policy with the given idle threshold (raw minutes string).
    pub fn new(idle_timeout_minutes: impl Into<String>) -> Self {
        Self {
            idle_timeout_minutes: idle_timeout_minutes.into(),
            threshold_warned: AtomicBool::new(false),
        }
    }

    /// The configured raw threshold.
    pub fn idle_timeout_minutes(&self) -> &str {
        &self.idle_timeout_minutes
    }

    /// Evaluate the agent for reclamation.
    ///
    /// Fires only when the agent is idle, online, not mid-connection, and
    /// accepting tasks, and its idle time exceeds the configured threshold.
    /// On fire: mark temporarily offline, prompt the scheduler to re-match
    /// its queue, stop accepting tasks, then request VM termination and
    /// deregistration. "Accepting tasks" flips off before termination so
    /// no new work lands on an agent mid-teardown.
    ///
    /// Returns the advisory delay until the next check.
    pub async fn check(
        &self,
        computer: &dyn AgentComputer,
        registry: &dyn AgentRegistry,
    ) -> Duration {
        if computer.is_idle()
            && !computer.is_offline()
            && !computer.is_connecting()
            && computer.is_accepting_tasks()
        {
            match self.parse_threshold() {
                Ok(threshold) => {
                    let idle = computer.idle_duration();
                    if idle > threshold {
                        tracing::info!(
                            agent = computer.name(),
                            idle_secs = idle.as_secs(),
                            threshold_secs = threshold.as_secs(),
                            "Reclaiming idle agent"
                        );
                        computer.set_temporarily_offline(OfflineCause::Idle);
                        registry.reevaluate_queue().await;
                        computer.set_accepting_tasks(false);
                        computer.terminate_node().await;
                    }
                }
                Err(e) => {
                    if !self.threshold_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(agent = computer.name(), error = %e, "Reclamation disabled");
                    }
                }
            }
        }

        CHECK_INTERVAL
    }

    /// Parse the configured threshold into a duration.
    fn parse_threshold(&self) -> Result<Duration, FleetError> {
        let minutes: i64 = self
            .idle_timeout_minutes
            .trim()
            .parse()
            .map_err(|_| FleetError::InvalidIdleThreshold(self.idle_timeout_minutes.clone()))?;
        if minutes <= 0 {
            return Err(FleetError::InvalidIdleThreshold(
                self.idle_timeout_minutes.clone(),
            ));
        }
        Ok(Duration::from_secs(minutes as u64 * 60))
    }
}
