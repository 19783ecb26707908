//! Wire types for the internal agent protocol
//!
//! TigerStyle: Explicit types, clear semantics, stable subject scheme.
//!
//! Agents and the node share an internal bus. Each agent process listens
//! on a per-workload subject tree; the node's agent client drives it via
//! request/reply.

use selkie_core::constants::{
    WORKLOAD_NAMESPACE_LENGTH_BYTES_MAX, WORKLOAD_TRIGGER_SUBJECTS_COUNT_MAX,
};
use selkie_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Subject prefix for the internal agent protocol
pub const AGENT_SUBJECT_PREFIX: &str = "agentint";

/// Header carrying the originating trigger subject on trigger RPCs
pub const TRIGGER_SUBJECT_HEADER: &str = "x-nex-trigger-subject";

/// Header carrying the function execution time in nanoseconds on trigger
/// replies
pub const RUNTIME_NS_HEADER: &str = "x-nex-runtime-ns";

/// Handshake subject for a workload's agent
pub fn handshake_subject(workload_id: &str) -> String {
    format!("{}.{}.handshake", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Deploy RPC subject for a workload's agent
pub fn deploy_subject(workload_id: &str) -> String {
    format!("{}.{}.deploy", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Undeploy RPC subject for a workload's agent
pub fn undeploy_subject(workload_id: &str) -> String {
    format!("{}.{}.undeploy", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Trigger RPC subject for a workload's agent
pub fn trigger_subject(workload_id: &str) -> String {
    format!("{}.{}.trigger", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Event emission subject for a workload's agent
pub fn events_subject(workload_id: &str) -> String {
    format!("{}.{}.events", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Log emission subject for a workload's agent
pub fn logs_subject(workload_id: &str) -> String {
    format!("{}.{}.logs", AGENT_SUBJECT_PREFIX, workload_id)
}

/// Workload type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    /// Native binary
    Native,
    /// Interpreted script
    Script,
    /// OCI container
    Container,
    /// Wasm module
    Wasm,
}

impl std::fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Script => write!(f, "script"),
            Self::Container => write!(f, "container"),
            Self::Wasm => write!(f, "wasm"),
        }
    }
}

/// A workload deployment request
///
/// The manager reads only the fields below; anything else the control
/// plane attaches rides along in `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Workload name
    pub workload_name: String,

    /// Workload type tag
    pub workload_type: WorkloadType,

    /// Namespace the workload belongs to
    pub namespace: String,

    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Total artifact size in bytes
    pub total_bytes: u64,

    /// Artifact content hash
    pub hash: String,

    /// Trigger subjects for function-style workloads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_subjects: Vec<String>,

    /// Fields the manager does not interpret
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeployRequest {
    /// Whether this workload declares trigger subjects
    pub fn supports_trigger_subjects(&self) -> bool {
        !self.trigger_subjects.is_empty()
    }

    /// Validate the observable attributes
    pub fn validate(&self) -> Result<()> {
        if self.workload_name.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "workload_name".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.namespace.is_empty()
            || self.namespace.len() > WORKLOAD_NAMESPACE_LENGTH_BYTES_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "namespace".into(),
                reason: format!(
                    "length must be in 1..={}",
                    WORKLOAD_NAMESPACE_LENGTH_BYTES_MAX
                ),
            });
        }

        if self.trigger_subjects.len() > WORKLOAD_TRIGGER_SUBJECTS_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "trigger_subjects".into(),
                reason: format!(
                    "count must be at most {}",
                    WORKLOAD_TRIGGER_SUBJECTS_COUNT_MAX
                ),
            });
        }

        Ok(())
    }
}

/// Agent reply to a deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    /// Whether the agent accepted the deployment
    pub accepted: bool,

    /// Rejection reason or informational message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Handshake message published by a warmed agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Workload ID the agent is bound to
    pub workload_id: String,

    /// Optional agent greeting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Event envelope emitted by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEventEnvelope {
    /// Namespace of the workload emitting the event
    pub namespace: String,

    /// Event type tag
    pub event_type: String,

    /// CloudEvents payload, opaque to the node
    #[serde(default)]
    pub event: serde_json::Value,
}

/// Log line emitted by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEnvelope {
    /// Namespace of the workload emitting the log
    pub namespace: String,

    /// Log text
    pub text: String,

    /// Log level ("trace" | "debug" | "info" | "warn" | "error")
    pub level: String,

    /// Emitting component id inside the agent
    pub id: String,
}
