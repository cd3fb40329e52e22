//! # kiln-vm
//!
//! MicroVM lifecycle layer for Kiln. Boots Firecracker-style hypervisor
//! instances as disposable compute units: tap-device binding, process
//! spawning, control-plane configuration over the local API socket, bounded
//! readiness polling, and best-effort teardown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kiln_vm::{MicroVm, VmSpec, VmState};
//! use std::sync::Arc;
//!
//! # async fn example() -> kiln_vm::Result<()> {
//! let spec = Arc::new(
//!     VmSpec::builder()
//!         .kernel("/var/lib/kiln/vmlinux")
//!         .rootfs("/var/lib/kiln/rootfs.ext4")
//!         .bridge_iface("br0")
//!         .build()?,
//! );
//!
//! let mut vm = MicroVm::new("agent-1", spec);
//! vm.start().await?;
//! assert_eq!(vm.state(), VmState::Running);
//! let ip = vm.ip().expect("running instances have an address");
//!
//! // ... hand `ip` to the agent bootstrap ...
//!
//! vm.terminate().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifecycle
//!
//! `Created → NetworkBound → ProcessRunning → SocketReady → Configured →
//! Running`, with `Failed` and `Terminated` reachable from any non-terminal
//! state. Transitions are strictly forward; a terminated instance is never
//! reused.

pub mod api;
mod config;
mod error;
mod machine;
pub mod network;
mod readiness;

pub use config::{VmSpec, VmSpecBuilder, DEFAULT_BOOT_ARGS};
pub use error::{Result, VmError};
pub use machine::{MicroVm, VmState};
pub use network::{NetworkBinder, GUEST_MAC};
pub use readiness::{ReadinessProbe, TimedOut};
