//! # kiln-fleet
//!
//! Fleet orchestration layer for Kiln. Elastically provisions microVM-backed
//! execution agents for a job-scheduling host and reclaims them once idle.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     kiln-fleet (host)                     │
//! ├───────────────────────────────────────────────────────────┤
//! │                                                           │
//! │  scheduler ──▶ FleetManager::provision(label, demand)     │
//! │                     │  first-match template,              │
//! │                     │  capacity from live registry        │
//! │                     ▼                                     │
//! │              PlannedAgent (join handle)                   │
//! │                     │  one provisioning task per agent    │
//! │                     ▼                                     │
//! │              MicroVm::start()  ──failure──▶ rollback      │
//! │                     │                       terminate()   │
//! │                     ▼                                     │
//! │              VmAgent {descriptor, vm}                     │
//! │                     │  IP handed to remote bootstrap      │
//! │                     ▼                                     │
//! │              bootstrap::await_remote_access(ip:22)        │
//! │                                                           │
//! │  scheduler tick ──▶ RetentionPolicy::check(computer)      │
//! │                     idle past threshold: offline →        │
//! │                     requeue → stop accepting → terminate  │
//! │                                                           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Collaborators
//!
//! The scheduler side is abstracted behind two narrow traits: a live
//! [`AgentRegistry`] (single source of truth for capacity) and a per-agent
//! [`AgentComputer`] view consumed by the retention policy. The fleet
//! duplicates no scheduler state.

mod bootstrap;
mod error;
mod fleet;
mod provision;
mod registry;
mod retention;
mod template;

pub use bootstrap::{await_remote_access, await_remote_access_with, DEFAULT_REMOTE_ACCESS_PORT};
pub use error::{FleetError, Result};
pub use fleet::{FleetConfig, FleetManager, PlannedAgent};
pub use provision::{AgentDescriptor, VmAgent};
pub use registry::{AgentComputer, AgentRegistry, OfflineCause};
pub use retention::RetentionPolicy;
pub use template::AgentTemplate;
