//! Error types for agent client operations
//!
//! TigerStyle: Explicit error variants with context.

use selkie_bus::BusError;
use thiserror::Error;

/// Result type for agent client operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent client errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// The client was already started for a workload
    #[error("agent client already started: {workload_id}")]
    AlreadyStarted { workload_id: String },

    /// An operation requires a started client
    #[error("agent client not started")]
    NotStarted,

    /// Failed to encode an outbound payload
    #[error("failed to encode payload for subject {subject}: {reason}")]
    EncodeFailed { subject: String, reason: String },

    /// Failed to decode an inbound payload
    #[error("failed to decode payload from subject {subject}: {reason}")]
    DecodeFailed { subject: String, reason: String },

    /// An RPC did not complete within the client timeout
    #[error("rpc on subject {subject} timed out after {timeout_ms}ms")]
    RpcTimeout { subject: String, timeout_ms: u64 },

    /// An RPC failed in the transport
    #[error("rpc on subject {subject} failed: {reason}")]
    Rpc { subject: String, reason: String },
}

impl AgentError {
    /// Map a bus error from an RPC on `subject`
    pub fn from_bus(subject: impl Into<String>, err: BusError) -> Self {
        match err {
            BusError::RequestTimeout { timeout_ms, .. } => Self::RpcTimeout {
                subject: subject.into(),
                timeout_ms,
            },
            other => Self::Rpc {
                subject: subject.into(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<AgentError> for selkie_core::Error {
    fn from(err: AgentError) -> Self {
        selkie_core::Error::Internal {
            reason: err.to_string(),
        }
    }
}
