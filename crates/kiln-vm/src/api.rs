//! Hypervisor control-plane client.
//!
//! The hypervisor exposes its configuration API over a local Unix socket.
//! Requests are plain HTTP PUTs with JSON bodies; this module provides the
//! typed bodies and a thin client that sends them directly over the socket.

use crate::error::{Result, VmError};
use hyper::{Body, Client, Method, Request};
use hyperlocal::{UnixClientExt, Uri};
use serde::Serialize;
use std::path::Path;

/// `PUT /boot-source` body.
#[derive(Debug, Clone, Serialize)]
pub struct BootSource {
    pub kernel_image_path: String,
    pub boot_args: String,
}

/// `PUT /drives/{id}` body.
#[derive(Debug, Clone, Serialize)]
pub struct Drive {
    pub drive_id: String,
    pub path_on_host: String,
    pub is_root_device: bool,
    pub is_read_only: bool,
}

/// `PUT /machine-config` body.
#[derive(Debug, Clone, Serialize)]
pub struct MachineConfiguration {
    pub vcpu_count: u8,
    pub mem_size_mib: u32,
    pub ht_enabled: bool,
}

/// `PUT /network-interfaces/{id}` body.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    pub iface_id: String,
    pub guest_mac: String,
    pub host_dev_name: String,
}

/// `PUT /actions` body.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub action_type: String,
}

impl Action {
    /// The action that boots a fully configured instance.
    pub fn instance_start() -> Self {
        Self {
            action_type: "InstanceStart".to_string(),
        }
    }
}

/// Send a PUT request to the control-plane socket.
///
/// Returns `ConfigurationApi` (carrying the path and response body) on any
/// non-success status.
pub async fn put<T: Serialize>(socket_path: &Path, path: &str, body: &T) -> Result<()> {
    let json = serde_json::to_string(body)
        .map_err(|e| VmError::Spec(format!("failed to serialize {path} body: {e}")))?;
    tracing::trace!(path, body = %json, "control-plane request");

    let uri: hyper::Uri = Uri::new(socket_path, path).into();
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .map_err(|e| VmError::Spec(format!("failed to build {path} request: {e}")))?;

    let client = Client::unix();
    let response = client
        .request(request)
        .await
        .map_err(|e| VmError::ConfigurationApi {
            path: path.to_string(),
            status: 0,
            body: format!("request failed: {e}"),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body_bytes = hyper::body::to_bytes(response.into_body())
            .await
            .unwrap_or_default();
        let body_str = String::from_utf8_lossy(&body_bytes).into_owned();
        tracing::error!(path, status = %status, body = %body_str, "control-plane call rejected");
        return Err(VmError::ConfigurationApi {
            path: path.to_string(),
            status: status.as_u16(),
            body: body_str,
        });
    }

    tracing::debug!(path, status = %status, "control-plane call accepted");
    Ok(())
}
