//! Error types for kiln-vm.

use thiserror::Error;

/// Result type alias for kiln-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while driving a MicroVM through its lifecycle.
///
/// Every variant aborts `MicroVm::start()` and leaves the instance in the
/// `Failed` state. Cleanup failures are deliberately absent: `terminate()`
/// absorbs them and only logs.
#[derive(Debug, Error)]
pub enum VmError {
    /// Failed to spawn the hypervisor process
    #[error("failed to spawn hypervisor process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    /// One of the tap-device operations failed
    #[error("network setup failed: {0}")]
    NetworkSetup(String),

    /// The control socket never appeared
    #[error("timed out waiting for control socket after {attempts} attempts")]
    SocketTimeout { attempts: u32 },

    /// The control-plane API rejected a configuration call
    #[error("control API {path} returned status {status}: {body}")]
    ConfigurationApi {
        path: String,
        status: u16,
        body: String,
    },

    /// No ARP entry for the guest appeared within the polling budget
    #[error("timed out resolving guest IP after {attempts} attempts")]
    IpResolutionTimeout { attempts: u32 },

    /// Instance is not in the expected lifecycle state
    #[error("invalid VM state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Invalid VM specification
    #[error("invalid spec: {0}")]
    Spec(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
