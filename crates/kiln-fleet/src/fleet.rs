//! Capacity-bounded fleet manager.

use crate::error::Result;
use crate::provision::{self, VmAgent};
use crate::registry::AgentRegistry;
use crate::template::AgentTemplate;
use kiln_vm::VmSpec;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Fleet-wide configuration.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Maximum simultaneous VM-backed agents (default: 10).
    pub instance_cap: usize,
    /// Shared VM hardware/image specification.
    pub vm_spec: Arc<VmSpec>,
    /// Templates in matching order.
    pub templates: Vec<AgentTemplate>,
}

impl FleetConfig {
    /// Create a fleet configuration around a VM spec.
    pub fn new(vm_spec: Arc<VmSpec>) -> Self {
        Self {
            instance_cap: 10,
            vm_spec,
            templates: Vec::new(),
        }
    }

    /// Set the instance cap.
    pub fn instance_cap(mut self, cap: usize) -> Self {
        self.instance_cap = cap;
        self
    }

    /// Append a template.
    pub fn template(mut self, template: AgentTemplate) -> Self {
        self.templates.push(template);
        self
    }
}

/// An agent that has been planned but may not be ready yet.
///
/// The handle resolves to the provisioned agent once its VM reaches
/// `Running` and the guest address is known, or to the startup error after
/// rollback. The scheduler logs failed planned nodes and retries on a
/// later tick.
#[derive(Debug)]
pub struct PlannedAgent {
    /// Node name assigned up front (stable across success and failure).
    pub node_name: String,
    /// Executor slots the agent will contribute.
    pub num_executors: u32,
    /// Future resolving to the provisioned agent.
    pub handle: JoinHandle<Result<VmAgent>>,
}

/// Matches incoming demand to templates and emits provisioning tasks,
/// bounded by the fleet's instance cap.
pub struct FleetManager {
    config: FleetConfig,
    registry: Arc<dyn AgentRegistry>,
}

impl FleetManager {
    /// Create a fleet manager backed by the scheduler's live registry.
    pub fn new(config: FleetConfig, registry: Arc<dyn AgentRegistry>) -> Self {
        tracing::info!(
            instance_cap = config.instance_cap,
            templates = config.templates.len(),
            "Creating fleet manager"
        );
        Self { config, registry }
    }

    /// The fleet configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Plan agents for `demand` units of work carrying `label`.
    ///
    /// Template matching is first-match-only: the first template serving
    /// the label receives the whole call, with no spillover to later
    /// templates. One provisioning task is emitted per iteration while
    /// demand remains and the live agent count (plus agents planned in
    /// this call) stays under the cap; residual demand is left for the
    /// scheduler's next tick.
    ///
    /// The capacity read is not atomic across concurrent `provision`
    /// calls, so simultaneous callers can transiently overshoot the cap by
    /// at most one instance each; callers needing a hard bound must
    /// serialize externally.
    pub async fn provision(&self, label: Option<&str>, demand: u32) -> Vec<PlannedAgent> {
        let Some(template) = self.config.templates.iter().find(|t| t.matches(label)) else {
            tracing::debug!(label = ?label, "No template matches label");
            return Vec::new();
        };

        let mut planned = Vec::new();
        let mut demand = demand;
        while demand > 0 {
            let active = self.registry.count_active().await;
            if active + planned.len() >= self.config.instance_cap {
                tracing::info!(
                    active,
                    planned = planned.len(),
                    cap = self.config.instance_cap,
                    residual_demand = demand,
                    "Instance cap reached, leaving residual demand for a later tick"
                );
                break;
            }

            let node_name = template.create_node_name();
            tracing::info!(node = %node_name, label = ?label, "Provisioning microVM agent");

            let handle = tokio::spawn(provision::run(
                template.clone(),
                Arc::clone(&self.config.vm_spec),
                node_name.clone(),
            ));
            planned.push(PlannedAgent {
                node_name,
                num_executors: template.num_executors,
                handle,
            });

            // An executor count of zero would never drain demand.
            demand = demand.saturating_sub(template.num_executors.max(1));
        }

        planned
    }

    /// Whether this fleet can serve the given label at all.
    pub fn can_provision(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(l) => self
                .config
                .templates
                .iter()
                .any(|t| t.label.as_deref() == Some(l)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln_vm::VmSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Registry mock with an externally adjustable active count.
    struct FixedRegistry {
        active: AtomicUsize,
    }

    impl FixedRegistry {
        fn new(active: usize) -> Arc<Self> {
            Arc::new(Self {
                active: AtomicUsize::new(active),
            })
        }

        fn set_active(&self, count: usize) {
            self.active.store(count, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AgentRegistry for FixedRegistry {
        async fn count_active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        async fn reevaluate_queue(&self) {}

        async fn deregister(&self, _name: &str) {}
    }

    fn test_spec() -> Arc<VmSpec> {
        Arc::new(
            VmSpec::builder()
                .rootfs("/img/rootfs.ext4")
                .kernel("/img/vmlinux")
                .hypervisor_bin("/nonexistent/kiln-test-hypervisor")
                .build()
                .unwrap(),
        )
    }

    fn abort_all(planned: &[PlannedAgent]) {
        for agent in planned {
            agent.handle.abort();
        }
    }

    #[tokio::test]
    async fn test_provision_without_matching_template_is_empty() {
        let config = FleetConfig::new(test_spec()).template(AgentTemplate::new().label("linux"));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        let planned = manager.provision(Some("windows"), 3).await;
        assert!(planned.is_empty());
    }

    #[tokio::test]
    async fn test_provision_respects_capacity_within_one_call() {
        let config = FleetConfig::new(test_spec())
            .instance_cap(2)
            .template(AgentTemplate::new().label("linux"));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        let planned = manager.provision(Some("linux"), 5).await;
        assert_eq!(planned.len(), 2);
        abort_all(&planned);
    }

    #[tokio::test]
    async fn test_sequential_calls_never_exceed_cap() {
        let registry = FixedRegistry::new(0);
        let config = FleetConfig::new(test_spec())
            .instance_cap(3)
            .template(AgentTemplate::new().label("linux"));
        let manager = FleetManager::new(config, Arc::clone(&registry) as Arc<dyn AgentRegistry>);

        let first = manager.provision(Some("linux"), 2).await;
        assert_eq!(first.len(), 2);
        abort_all(&first);

        // The scheduler registered both agents before the next tick.
        registry.set_active(2);
        let second = manager.provision(Some("linux"), 4).await;
        assert_eq!(second.len(), 1);
        abort_all(&second);

        registry.set_active(3);
        let third = manager.provision(Some("linux"), 4).await;
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_demand_decrements_by_executor_count() {
        let config = FleetConfig::new(test_spec())
            .instance_cap(100)
            .template(AgentTemplate::new().label("linux").num_executors(2));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        // demand 5 with 2 executors per agent: 3 agents (2 + 2 + 1).
        let planned = manager.provision(Some("linux"), 5).await;
        assert_eq!(planned.len(), 3);
        abort_all(&planned);
    }

    #[tokio::test]
    async fn test_first_match_only_no_spillover() {
        let config = FleetConfig::new(test_spec())
            .instance_cap(100)
            .template(AgentTemplate::new().label("a").num_executors(2))
            .template(AgentTemplate::new().label("b").num_executors(3));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        let planned = manager.provision(Some("a"), 5).await;
        assert_eq!(planned.len(), 3);
        assert!(planned.iter().all(|p| p.num_executors == 2));
        abort_all(&planned);

        let planned = manager.provision(Some("b"), 5).await;
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|p| p.num_executors == 3));
        abort_all(&planned);
    }

    #[tokio::test]
    async fn test_absent_label_uses_first_template() {
        let config = FleetConfig::new(test_spec())
            .instance_cap(100)
            .template(AgentTemplate::new().label("a").num_executors(2))
            .template(AgentTemplate::new().label("b").num_executors(3));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        let planned = manager.provision(None, 2).await;
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].num_executors, 2);
        abort_all(&planned);
    }

    #[tokio::test]
    async fn test_can_provision() {
        let config = FleetConfig::new(test_spec()).template(AgentTemplate::new().label("linux"));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        assert!(manager.can_provision(None));
        assert!(manager.can_provision(Some("linux")));
        assert!(!manager.can_provision(Some("windows")));
    }

    #[tokio::test]
    async fn test_zero_executor_template_still_drains_demand() {
        let config = FleetConfig::new(test_spec())
            .instance_cap(100)
            .template(AgentTemplate::new().label("a").num_executors(0));
        let manager = FleetManager::new(config, FixedRegistry::new(0));

        let planned = manager.provision(Some("a"), 3).await;
        assert_eq!(planned.len(), 3);
        abort_all(&planned);
    }
}
