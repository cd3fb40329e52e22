//! Error types for kiln-fleet.

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for kiln-fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors that can occur during fleet provisioning and reclamation.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Error from the VM lifecycle layer
    #[error("VM error: {0}")]
    Vm(#[from] kiln_vm::VmError),

    /// The guest's remote-access port never became connectable
    #[error("timed out waiting for remote access on {addr} after {attempts} attempts")]
    RemoteAccessTimeout { addr: SocketAddr, attempts: u32 },

    /// The idle threshold is not a positive integer of minutes.
    ///
    /// Recoverable: retention logs this once and disables reclamation for
    /// the agent; it is never raised to the scheduling tick.
    #[error("invalid idle threshold {0:?}: reclamation disabled")]
    InvalidIdleThreshold(String),

    /// Instance reached Running without a resolved address
    #[error("no guest IP resolved for instance {0}")]
    MissingIp(String),
}
