//! MicroVm type - per-instance boot/configure/teardown state machine.

use crate::api;
use crate::config::VmSpec;
use crate::error::{Result, VmError};
use crate::network::{self, NetworkBinder, GUEST_IFACE_ID, GUEST_MAC};
use crate::readiness::ReadinessProbe;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use uuid::Uuid;

/// Control-socket existence poll: 100 ms between attempts, ~3 s ceiling.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SOCKET_POLL_ATTEMPTS: u32 = 30;

/// Guest IP poll: 1 s between attempts, ~60 s ceiling.
const IP_POLL_INTERVAL: Duration = Duration::from_secs(1);
const IP_POLL_ATTEMPTS: u32 = 60;

/// Grace period between SIGTERM and SIGKILL during termination.
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of a MicroVM instance.
///
/// States advance strictly forward; `Failed` and `Terminated` are terminal
/// and reachable from any non-terminal state. A terminated instance is
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    /// Instance constructed, nothing allocated yet
    Created,
    /// Tap device exists, is up, and is attached to the bridge
    NetworkBound,
    /// Hypervisor process spawned
    ProcessRunning,
    /// Control socket answered existence polling
    SocketReady,
    /// All control-plane configuration calls accepted
    Configured,
    /// Instance booted and guest IP resolved
    Running,
    /// Startup aborted; resources may be partially allocated
    Failed,
    /// Teardown completed (best-effort)
    Terminated,
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmState::Created => write!(f, "created"),
            VmState::NetworkBound => write!(f, "network-bound"),
            VmState::ProcessRunning => write!(f, "process-running"),
            VmState::SocketReady => write!(f, "socket-ready"),
            VmState::Configured => write!(f, "configured"),
            VmState::Running => write!(f, "running"),
            VmState::Failed => write!(f, "failed"),
            VmState::Terminated => write!(f, "terminated"),
        }
    }
}

/// A single microVM instance and the host resources backing it.
///
/// An instance is owned and mutated by exactly one task at a time; there is
/// no internal locking. The scratch directory, control socket, and tap name
/// are all derived from the instance id and stay unique for its lifetime.
pub struct MicroVm {
    id: Uuid,
    name: String,
    spec: Arc<VmSpec>,
    state: VmState,
    scratch_dir: PathBuf,
    socket_path: PathBuf,
    network: NetworkBinder,
    ip: Option<Ipv4Addr>,
    process: Option<Child>,
}

impl MicroVm {
    /// Construct an instance from a fleet spec. Nothing is allocated until
    /// [`start()`](Self::start).
    pub fn new(name: impl Into<String>, spec: Arc<VmSpec>) -> Self {
        let id = Uuid::new_v4();
        let scratch_dir = std::env::temp_dir().join(format!("kiln-{id}"));
        let socket_path = scratch_dir.join("firecracker.socket");
        let network = NetworkBinder::new(network::tap_name_for(&id), spec.bridge_iface.clone());

        Self {
            id,
            name: name.into(),
            spec,
            state: VmState::Created,
            scratch_dir,
            socket_path,
            network,
            ip: None,
            process: None,
        }
    }

    /// Unique id of this instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Display name of this instance.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VmState {
        self.state
    }

    /// Guest IP, available once the instance reaches `Running`.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    /// Path to the control-plane socket.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Tap device backing the guest network interface.
    pub fn tap_device(&self) -> &str {
        self.network.tap_device()
    }

    /// Drive the instance from `Created` to `Running`.
    ///
    /// Sequence: scratch allocation, network bind, hypervisor spawn, socket
    /// poll, ordered configuration, guest IP poll. Any failure aborts
    /// immediately and leaves the instance in `Failed`; rollback via
    /// [`terminate()`](Self::terminate) is the caller's responsibility.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != VmState::Created {
            return Err(VmError::InvalidState {
                expected: "created".into(),
                actual: self.state.to_string(),
            });
        }

        tracing::info!(id = %self.id, name = %self.name, "Starting microVM");
        match self.start_inner().await {
            Ok(()) => {
                tracing::info!(id = %self.id, name = %self.name, ip = ?self.ip, "MicroVM running");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(id = %self.id, name = %self.name, error = %e, "MicroVM startup failed");
                self.state = VmState::Failed;
                Err(e)
            }
        }
    }

    async fn start_inner(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        self.network.bind().await?;
        self.state = VmState::NetworkBound;

        self.process = Some(self.spawn_hypervisor()?);
        self.state = VmState::ProcessRunning;

        self.await_socket().await?;
        self.state = VmState::SocketReady;

        self.configure().await?;
        self.state = VmState::Configured;

        self.ip = Some(self.await_guest_ip().await?);
        self.state = VmState::Running;
        Ok(())
    }

    /// Spawn the hypervisor bound to the control socket, with combined
    /// stdout/stderr captured to the scratch directory.
    fn spawn_hypervisor(&self) -> Result<Child> {
        let console_log = std::fs::File::create(self.scratch_dir.join("console.log"))?;
        let console_log_err = console_log.try_clone()?;

        tracing::debug!(
            id = %self.id,
            bin = %self.spec.hypervisor_bin.display(),
            socket = %self.socket_path.display(),
            "Spawning hypervisor"
        );

        Command::new(&self.spec.hypervisor_bin)
            .arg("--api-sock")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(console_log))
            .stderr(Stdio::from(console_log_err))
            .spawn()
            .map_err(VmError::ProcessSpawn)
    }

    /// Poll for the control socket to appear on disk.
    async fn await_socket(&self) -> Result<()> {
        let socket = self.socket_path.clone();
        let probe = ReadinessProbe::new(SOCKET_POLL_INTERVAL, SOCKET_POLL_ATTEMPTS);
        let attempt = probe
            .wait(|| {
                let socket = socket.clone();
                async move { tokio::fs::try_exists(&socket).await.unwrap_or(false) }
            })
            .await
            .map_err(|t| VmError::SocketTimeout {
                attempts: t.attempts,
            })?;
        tracing::debug!(id = %self.id, attempt, "Control socket ready");
        Ok(())
    }

    /// Issue the configuration sequence to the control-plane API.
    ///
    /// The order is load-bearing: the boot source and root device must be
    /// set before the start action or the hypervisor rejects it.
    async fn configure(&self) -> Result<()> {
        let socket = &self.socket_path;

        api::put(
            socket,
            "/boot-source",
            &api::BootSource {
                kernel_image_path: self.spec.kernel_path.to_string_lossy().into_owned(),
                boot_args: self.spec.boot_args.clone(),
            },
        )
        .await?;

        api::put(
            socket,
            "/drives/rootfs",
            &api::Drive {
                drive_id: "rootfs".to_string(),
                path_on_host: self.spec.rootfs_path.to_string_lossy().into_owned(),
                is_root_device: true,
                is_read_only: false,
            },
        )
        .await?;

        api::put(
            socket,
            "/machine-config",
            &api::MachineConfiguration {
                vcpu_count: self.spec.vcpu_count,
                mem_size_mib: self.spec.memory_mib,
                ht_enabled: false,
            },
        )
        .await?;

        api::put(
            socket,
            &format!("/network-interfaces/{GUEST_IFACE_ID}"),
            &api::NetworkInterface {
                iface_id: GUEST_IFACE_ID.to_string(),
                guest_mac: GUEST_MAC.to_string(),
                host_dev_name: self.network.tap_device().to_string(),
            },
        )
        .await?;

        api::put(socket, "/actions", &api::Action::instance_start()).await?;

        tracing::debug!(id = %self.id, "Instance configured and started");
        Ok(())
    }

    /// Poll the host ARP table until the guest's fixed MAC resolves.
    async fn await_guest_ip(&self) -> Result<Ipv4Addr> {
        let probe = ReadinessProbe::new(IP_POLL_INTERVAL, IP_POLL_ATTEMPTS);
        probe
            .wait_for(network::resolve_guest_ip)
            .await
            .map_err(|t| VmError::IpResolutionTimeout {
                attempts: t.attempts,
            })
    }

    /// Tear down the instance and everything it allocated.
    ///
    /// Best-effort and idempotent: every step checks that its resource
    /// still exists, every failure is logged and swallowed, and the state
    /// becomes `Terminated` unconditionally. Calling this on a
    /// never-started or already-terminated instance is a safe no-op.
    pub async fn terminate(&mut self) {
        tracing::info!(id = %self.id, name = %self.name, state = %self.state, "Terminating microVM");

        if let Some(mut child) = self.process.take() {
            self.stop_process(&mut child).await;
        }

        if self.network.is_bound() {
            if let Err(e) = self.network.unbind().await {
                tracing::warn!(id = %self.id, error = %e, "Failed to remove tap device");
            }
        }

        if tokio::fs::try_exists(&self.socket_path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
                tracing::warn!(id = %self.id, error = %e, "Failed to remove control socket");
            }
        }
        if tokio::fs::try_exists(&self.scratch_dir).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await {
                tracing::warn!(id = %self.id, error = %e, "Failed to remove scratch directory");
            }
        }

        self.state = VmState::Terminated;
        tracing::info!(id = %self.id, name = %self.name, "MicroVM terminated");
    }

    /// Stop the hypervisor process: graceful signal, bounded wait, then
    /// forced kill if it is still alive.
    async fn stop_process(&self, child: &mut Child) {
        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(id = %self.id, %status, "Hypervisor already exited");
            return;
        }

        if let Some(pid) = child.id() {
            tracing::debug!(id = %self.id, pid, "Sending SIGTERM to hypervisor");
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(id = %self.id, %status, "Hypervisor exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(id = %self.id, error = %e, "Failed waiting for hypervisor exit");
            }
            Err(_) => {
                tracing::warn!(
                    id = %self.id,
                    timeout = ?GRACEFUL_STOP_TIMEOUT,
                    "Hypervisor did not stop gracefully, killing"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(id = %self.id, error = %e, "Failed to kill hypervisor");
                }
            }
        }
    }
}

impl std::fmt::Debug for MicroVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroVm")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("tap_device", &self.network.tap_device())
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}
