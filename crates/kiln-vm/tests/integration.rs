//! Integration tests for kiln-vm.
//!
//! These tests require:
//! - Linux with /dev/kvm access
//! - Firecracker binary installed
//! - Kernel and rootfs images
//! - Root (or passwordless sudo) for tap-device management
//!
//! Run with: `cargo test -p kiln-vm -- --ignored`

use kiln_vm::{MicroVm, VmSpec, VmState};
use std::path::Path;
use std::sync::Arc;

fn spec_from_env() -> Option<Arc<VmSpec>> {
    let kernel_path = std::env::var("KILN_KERNEL_PATH")
        .unwrap_or_else(|_| "/var/lib/kiln/kernel/vmlinux".to_string());
    let rootfs_path = std::env::var("KILN_ROOTFS_PATH")
        .unwrap_or_else(|_| "/var/lib/kiln/images/agent.ext4".to_string());
    let bridge = std::env::var("KILN_BRIDGE_IFACE").unwrap_or_else(|_| "br0".to_string());

    if !Path::new(&kernel_path).exists() || !Path::new(&rootfs_path).exists() {
        eprintln!("Skipping test: kernel or rootfs not found");
        eprintln!("Set KILN_KERNEL_PATH and KILN_ROOTFS_PATH environment variables");
        return None;
    }

    Some(Arc::new(
        VmSpec::builder()
            .kernel(kernel_path)
            .rootfs(rootfs_path)
            .bridge_iface(bridge)
            .memory_mib(128)
            .vcpu_count(1)
            .build()
            .expect("spec should validate"),
    ))
}

/// Full lifecycle: start -> Running with an IP -> terminate.
#[tokio::test]
#[ignore = "requires Linux + KVM + firecracker + root"]
async fn test_vm_lifecycle() {
    let Some(spec) = spec_from_env() else {
        return;
    };

    let mut vm = MicroVm::new("kiln-it-lifecycle", spec);
    vm.start().await.expect("Failed to start VM");

    assert_eq!(vm.state(), VmState::Running);
    assert!(vm.ip().is_some(), "running VM should have resolved an IP");

    vm.terminate().await;
    assert_eq!(vm.state(), VmState::Terminated);
}

/// A failed startup must leave the instance in Failed, and rollback
/// termination must still clean up and land in Terminated.
#[tokio::test]
#[ignore = "requires root for tap-device management"]
async fn test_spawn_failure_is_failed_then_rollback_terminates() {
    let spec = Arc::new(
        VmSpec::builder()
            .kernel("/img/vmlinux")
            .rootfs("/img/rootfs.ext4")
            .hypervisor_bin("/nonexistent/kiln-no-such-hypervisor")
            .build()
            .expect("spec should validate"),
    );

    let mut vm = MicroVm::new("kiln-it-spawnfail", spec);
    let result = vm.start().await;

    assert!(result.is_err());
    assert_eq!(vm.state(), VmState::Failed);

    vm.terminate().await;
    assert_eq!(vm.state(), VmState::Terminated);

    // Idempotent: a second terminate changes nothing and does not error.
    vm.terminate().await;
    assert_eq!(vm.state(), VmState::Terminated);
}
