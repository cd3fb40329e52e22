//! VM specification types.

use crate::error::VmError;
use std::path::PathBuf;

/// Kernel command line handed to every instance.
pub const DEFAULT_BOOT_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off";

/// Immutable description of the VM hardware and images for one fleet.
///
/// A spec is built once per fleet configuration and shared read-only across
/// all instances provisioned from it (wrap in `Arc` for sharing).
#[derive(Debug, Clone)]
pub struct VmSpec {
    /// Path to the root filesystem image.
    pub rootfs_path: PathBuf,
    /// Path to the uncompressed kernel image.
    pub kernel_path: PathBuf,
    /// Kernel boot arguments.
    pub boot_args: String,
    /// Memory in MiB (default: 1024).
    pub memory_mib: u32,
    /// vCPU count (default: 1).
    pub vcpu_count: u8,
    /// Host bridge interface tap devices are attached to (default: "eth0").
    pub bridge_iface: String,
    /// Hypervisor binary to spawn (default: "firecracker", resolved via PATH).
    pub hypervisor_bin: PathBuf,
}

impl Default for VmSpec {
    fn default() -> Self {
        Self {
            rootfs_path: PathBuf::new(),
            kernel_path: PathBuf::new(),
            boot_args: DEFAULT_BOOT_ARGS.to_string(),
            memory_mib: 1024,
            vcpu_count: 1,
            bridge_iface: "eth0".to_string(),
            hypervisor_bin: PathBuf::from("firecracker"),
        }
    }
}

impl VmSpec {
    /// Create a new spec builder.
    pub fn builder() -> VmSpecBuilder {
        VmSpecBuilder::default()
    }

    /// Validate the specification.
    pub fn validate(&self) -> Result<(), VmError> {
        if self.rootfs_path.as_os_str().is_empty() {
            return Err(VmError::Spec("rootfs_path is required".into()));
        }
        if self.kernel_path.as_os_str().is_empty() {
            return Err(VmError::Spec("kernel_path is required".into()));
        }
        if self.memory_mib == 0 {
            return Err(VmError::Spec("memory_mib must be > 0".into()));
        }
        if self.vcpu_count == 0 {
            return Err(VmError::Spec("vcpu_count must be > 0".into()));
        }
        if self.bridge_iface.is_empty() {
            return Err(VmError::Spec("bridge_iface is required".into()));
        }
        Ok(())
    }
}

/// Fluent builder for [`VmSpec`].
#[derive(Debug, Default)]
pub struct VmSpecBuilder {
    spec: VmSpec,
}

impl VmSpecBuilder {
    /// Set the root filesystem image path.
    pub fn rootfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.rootfs_path = path.into();
        self
    }

    /// Set the kernel image path.
    pub fn kernel(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.kernel_path = path.into();
        self
    }

    /// Set the kernel boot arguments.
    pub fn boot_args(mut self, args: impl Into<String>) -> Self {
        self.spec.boot_args = args.into();
        self
    }

    /// Set memory in MiB.
    pub fn memory_mib(mut self, mib: u32) -> Self {
        self.spec.memory_mib = mib;
        self
    }

    /// Set vCPU count.
    pub fn vcpu_count(mut self, count: u8) -> Self {
        self.spec.vcpu_count = count;
        self
    }

    /// Set the host bridge interface.
    pub fn bridge_iface(mut self, iface: impl Into<String>) -> Self {
        self.spec.bridge_iface = iface.into();
        self
    }

    /// Set the hypervisor binary path.
    pub fn hypervisor_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.hypervisor_bin = path.into();
        self
    }

    /// Build the spec, validating required fields.
    pub fn build(self) -> Result<VmSpec, VmError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}
