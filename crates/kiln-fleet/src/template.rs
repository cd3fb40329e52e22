//! Agent templates.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Process-global sequence for template ids (part of generated node names).
static TEMPLATE_SEQ: AtomicU32 = AtomicU32::new(1);

/// Blueprint for a class of microVM-backed agents.
///
/// A template is immutable once a provisioning decision has been made from
/// it; the fleet manager clones what it needs into each planned agent.
#[derive(Debug, Clone)]
pub struct AgentTemplate {
    /// Label this template serves; `None` means "can run anywhere".
    pub label: Option<String>,
    /// Human-readable description shown next to the agent.
    pub description: String,
    /// Executor slots each provisioned agent contributes.
    pub num_executors: u32,
    /// Working directory on the agent.
    pub remote_fs: String,
    /// Idle threshold in minutes, kept as the raw configured string.
    ///
    /// Parsing is deferred to the retention policy: a malformed value must
    /// disable reclamation for the agent, not fail template construction.
    pub idle_timeout_minutes: String,
    /// Additional node properties passed through to the scheduler.
    pub node_properties: BTreeMap<String, String>,
    /// Short per-template id used in generated node names.
    template_id: u32,
}

impl Default for AgentTemplate {
    fn default() -> Self {
        Self {
            label: None,
            description: String::new(),
            num_executors: 1,
            remote_fs: "/home/agent".to_string(),
            idle_timeout_minutes: "30".to_string(),
            node_properties: BTreeMap::new(),
            template_id: TEMPLATE_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl AgentTemplate {
    /// Create a template with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label this template serves.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the executor count.
    pub fn num_executors(mut self, count: u32) -> Self {
        self.num_executors = count;
        self
    }

    /// Set the agent working directory.
    pub fn remote_fs(mut self, path: impl Into<String>) -> Self {
        self.remote_fs = path.into();
        self
    }

    /// Set the idle threshold (raw minutes string).
    pub fn idle_timeout_minutes(mut self, minutes: impl Into<String>) -> Self {
        self.idle_timeout_minutes = minutes.into();
        self
    }

    /// Add a node property.
    pub fn node_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_properties.insert(key.into(), value.into());
        self
    }

    /// Whether this template serves the given label.
    ///
    /// An absent label means the work can run anywhere, so every template
    /// matches it.
    pub fn matches(&self, label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(l) => self.label.as_deref() == Some(l),
        }
    }

    /// Generate a fresh node name: `kiln-<template-id>-<uuid8>`.
    pub fn create_node_name(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("kiln-{}-{}", self.template_id, &suffix[..8])
    }
}
