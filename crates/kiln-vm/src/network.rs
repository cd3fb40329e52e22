//! Tap-device lifecycle and guest IP discovery.
//!
//! Each instance gets a private tap device attached to the fleet's host
//! bridge. Creating, raising, and enslaving the tap are three privileged
//! `ip(8)` operations run in sequence; any failure aborts the bind. The
//! guest's address is discovered by scanning the host's ARP table for the
//! fixed guest MAC.

use crate::error::{Result, VmError};
use std::net::Ipv4Addr;
use tokio::process::Command;
use uuid::Uuid;

/// Hardware address every guest network interface is configured with.
///
/// A single fixed MAC resolves unambiguously only while one VM is attached
/// to a given bridge at a time; this is a known scaling ceiling of the
/// fixed-MAC discovery scheme.
pub const GUEST_MAC: &str = "AA:FC:00:00:00:01";

/// Guest-side interface id used in the control-plane network call.
pub const GUEST_IFACE_ID: &str = "eth0";

/// Derive the tap-device name for an instance id.
///
/// Names are `tap` + the first 8 hex digits of the UUID, unique per
/// instance for its lifetime.
pub fn tap_name_for(id: &Uuid) -> String {
    let hex = id.simple().to_string();
    format!("tap{}", &hex[..8])
}

/// Tap-device lifecycle against a host bridge interface.
#[derive(Debug)]
pub struct NetworkBinder {
    tap_device: String,
    bridge_iface: String,
    bound: bool,
}

impl NetworkBinder {
    /// Create a binder for the given tap device and bridge.
    pub fn new(tap_device: impl Into<String>, bridge_iface: impl Into<String>) -> Self {
        Self {
            tap_device: tap_device.into(),
            bridge_iface: bridge_iface.into(),
            bound: false,
        }
    }

    /// The tap device this binder manages.
    pub fn tap_device(&self) -> &str {
        &self.tap_device
    }

    /// Whether the tap device currently exists on the host.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Create the tap device, bring it up, and attach it to the bridge.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if any of the three operations fails; earlier
    /// successful operations are not rolled back here (termination handles
    /// tap removal).
    pub async fn bind(&mut self) -> Result<()> {
        tracing::debug!(
            tap = %self.tap_device,
            bridge = %self.bridge_iface,
            "Binding tap device"
        );

        run_ip(&["tuntap", "add", &self.tap_device, "mode", "tap"]).await?;
        self.bound = true;
        run_ip(&["link", "set", &self.tap_device, "up"]).await?;
        run_ip(&["link", "set", &self.tap_device, "master", &self.bridge_iface]).await?;

        tracing::info!(tap = %self.tap_device, bridge = %self.bridge_iface, "Tap device bound");
        Ok(())
    }

    /// Remove the tap device.
    pub async fn unbind(&mut self) -> Result<()> {
        tracing::debug!(tap = %self.tap_device, "Removing tap device");
        run_ip(&["tuntap", "del", &self.tap_device, "mode", "tap"]).await?;
        self.bound = false;
        Ok(())
    }
}

/// Run a privileged `ip(8)` subcommand, mapping failure to `NetworkSetup`.
async fn run_ip(args: &[&str]) -> Result<()> {
    let output = Command::new("sudo")
        .arg("ip")
        .args(args)
        .output()
        .await
        .map_err(|e| VmError::NetworkSetup(format!("ip {}: {e}", args.join(" "))))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VmError::NetworkSetup(format!(
            "ip {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Look up the guest IP in the host's ARP table.
///
/// Returns `None` until an entry with [`GUEST_MAC`] appears (the guest must
/// have sent at least one frame through the bridge).
pub async fn resolve_guest_ip() -> Option<Ipv4Addr> {
    let output = Command::new("sudo")
        .args(["arp", "-n"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_neighbor_table(&String::from_utf8_lossy(&output.stdout), GUEST_MAC)
}

/// Scan `arp -n` output for a line carrying `mac` and return its address.
///
/// The MAC comparison is case-insensitive; the address is the first
/// whitespace-separated column of the matching line.
pub fn parse_neighbor_table(output: &str, mac: &str) -> Option<Ipv4Addr> {
    let needle = mac.to_ascii_lowercase();
    for line in output.lines() {
        if line.to_ascii_lowercase().contains(&needle) {
            if let Some(first) = line.split_whitespace().next() {
                if let Ok(ip) = first.parse() {
                    return Some(ip);
                }
            }
        }
    }
    None
}
