//! Provisioning task - drives one MicroVm to a connectable agent.

use crate::error::{FleetError, Result};
use crate::template::AgentTemplate;
use chrono::{DateTime, Utc};
use kiln_vm::{MicroVm, VmSpec};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Scheduler-facing description of a provisioned agent.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    /// Node name, unique per instance.
    pub name: String,
    /// Description inherited from the template.
    pub description: String,
    /// Working directory on the agent.
    pub remote_fs: String,
    /// Executor slots this agent contributes.
    pub num_executors: u32,
    /// Label the agent serves, if any.
    pub label: Option<String>,
    /// Node properties passed through to the scheduler.
    pub node_properties: BTreeMap<String, String>,
    /// Resolved guest address for the remote-login bootstrap.
    pub ip: Ipv4Addr,
    /// Raw idle threshold for the agent's retention policy.
    pub idle_timeout_minutes: String,
    /// When provisioning completed.
    pub created_at: DateTime<Utc>,
}

/// A provisioned agent: its scheduler-facing descriptor plus the owned
/// MicroVM instance backing it.
pub struct VmAgent {
    descriptor: AgentDescriptor,
    vm: MicroVm,
}

impl VmAgent {
    /// The agent's scheduler-facing descriptor.
    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    /// The backing MicroVM instance.
    pub fn vm(&self) -> &MicroVm {
        &self.vm
    }

    /// Node-removal hook: tear down the backing VM.
    ///
    /// Best-effort and idempotent, like the VM termination it delegates to;
    /// cleanup problems are logged, never raised, so deregistration can
    /// always proceed.
    pub async fn terminate(&mut self) {
        tracing::info!(agent = %self.descriptor.name, "Terminating agent VM");
        self.vm.terminate().await;
    }
}

impl std::fmt::Debug for VmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmAgent")
            .field("name", &self.descriptor.name)
            .field("ip", &self.descriptor.ip)
            .field("state", &self.vm.state())
            .finish_non_exhaustive()
    }
}

/// Run one provisioning task to completion.
///
/// Boots a fresh instance from the fleet spec and hands back the agent. On
/// any startup failure the instance is rolled back with `terminate()` -
/// which never raises, so the original start error is always the one the
/// caller sees.
pub(crate) async fn run(
    template: AgentTemplate,
    spec: Arc<VmSpec>,
    node_name: String,
) -> Result<VmAgent> {
    let mut vm = MicroVm::new(node_name.clone(), spec);

    if let Err(e) = vm.start().await {
        tracing::warn!(node = %node_name, error = %e, "Provisioning failed, rolling back");
        vm.terminate().await;
        return Err(e.into());
    }

    let Some(ip) = vm.ip() else {
        vm.terminate().await;
        return Err(FleetError::MissingIp(node_name));
    };

    let descriptor = AgentDescriptor {
        name: node_name,
        description: template.description.clone(),
        remote_fs: template.remote_fs.clone(),
        num_executors: template.num_executors,
        label: template.label.clone(),
        node_properties: template.node_properties.clone(),
        ip,
        idle_timeout_minutes: template.idle_timeout_minutes.clone(),
        created_at: Utc::now(),
    };

    tracing::info!(
        agent = %descriptor.name,
        ip = %descriptor.ip,
        executors = descriptor.num_executors,
        "Agent provisioned"
    );
    Ok(VmAgent { descriptor, vm })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_vm::VmState;

    fn test_spec() -> Arc<VmSpec> {
        Arc::new(
            VmSpec::builder()
                .rootfs("/img/rootfs.ext4")
                .kernel("/img/vmlinux")
                .build()
                .unwrap(),
        )
    }

    fn test_agent() -> VmAgent {
        let vm = MicroVm::new("kiln-1-test", test_spec());
        VmAgent {
            descriptor: AgentDescriptor {
                name: "kiln-1-test".into(),
                description: "test agent".into(),
                remote_fs: "/home/agent".into(),
                num_executors: 1,
                label: Some("linux".into()),
                node_properties: BTreeMap::new(),
                ip: Ipv4Addr::new(10, 0, 0, 7),
                idle_timeout_minutes: "30".into(),
                created_at: Utc::now(),
            },
            vm,
        }
    }

    #[tokio::test]
    async fn test_agent_terminate_is_idempotent() {
        let mut agent = test_agent();
        agent.terminate().await;
        assert_eq!(agent.vm().state(), VmState::Terminated);
        agent.terminate().await;
        assert_eq!(agent.vm().state(), VmState::Terminated);
    }

    #[test]
    fn test_descriptor_accessor() {
        let agent = test_agent();
        assert_eq!(agent.descriptor().name, "kiln-1-test");
        assert_eq!(agent.descriptor().label.as_deref(), Some("linux"));
    }
}
