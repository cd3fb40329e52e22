//! Remote-access readiness for the agent bootstrap.
//!
//! Once an instance is running and its address is known, the external
//! remote-login bootstrap takes over. The only thing it needs from the
//! fleet is confirmation that the guest's remote-access port accepts TCP
//! connections; this module provides that probe. Responsibility ends at
//! "network-reachable".

use crate::error::{FleetError, Result};
use kiln_vm::ReadinessProbe;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default remote-access (SSH) port on the guest.
pub const DEFAULT_REMOTE_ACCESS_PORT: u16 = 22;

/// Per-attempt TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Retry once per second, up to 60 attempts (~60 s ceiling).
const PROBE_INTERVAL: Duration = Duration::from_secs(1);
const PROBE_ATTEMPTS: u32 = 60;

/// Wait for the guest's remote-access port to become connectable.
pub async fn await_remote_access(addr: SocketAddr) -> Result<()> {
    await_remote_access_with(addr, ReadinessProbe::new(PROBE_INTERVAL, PROBE_ATTEMPTS)).await
}

/// [`await_remote_access`] with an explicit probe configuration.
pub async fn await_remote_access_with(addr: SocketAddr, probe: ReadinessProbe) -> Result<()> {
    tracing::debug!(%addr, "Waiting for remote access");
    let attempt = probe
        .wait(|| async move { connectable(addr).await })
        .await
        .map_err(|t| FleetError::RemoteAccessTimeout {
            addr,
            attempts: t.attempts,
        })?;
    tracing::info!(%addr, attempt, "Remote access available");
    Ok(())
}

/// One short-timeout connect attempt.
async fn connectable(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
