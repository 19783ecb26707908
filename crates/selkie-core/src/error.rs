//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Pool Errors
    // =========================================================================
    #[error("no available agent client in pool")]
    NoAvailableAgent,

    #[error("workload not found: {workload_id}")]
    WorkloadNotFound { workload_id: String },

    // =========================================================================
    // Deployment Errors
    // =========================================================================
    #[error("failed to prepare agent process for workload deployment: {workload_id}, reason: {reason}")]
    PrepareFailed { workload_id: String, reason: String },

    #[error("failed to submit request for workload deployment: {workload_id}, reason: {reason}")]
    DeploySubmissionFailed { workload_id: String, reason: String },

    #[error("workload rejected by agent: {message}")]
    DeployRejected { workload_id: String, message: String },

    #[error("failed to subscribe trigger subject {subject} for workload {workload_id}: {reason}")]
    TriggerInstallFailed {
        workload_id: String,
        subject: String,
        reason: String,
    },

    // =========================================================================
    // Stop Errors
    // =========================================================================
    #[error("failed to stop workload process: {workload_id}, reason: {reason}")]
    StopProcessFailed { workload_id: String, reason: String },

    // =========================================================================
    // Agent Errors
    // =========================================================================
    #[error("agent client failed to start: {workload_id}, reason: {reason}")]
    AgentStartFailed { workload_id: String, reason: String },

    // =========================================================================
    // Process Manager Errors
    // =========================================================================
    #[error("process manager operation failed: {reason}")]
    ProcessManagerFailed { reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error("serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a workload not found error
    pub fn workload_not_found(workload_id: impl Into<String>) -> Self {
        Self::WorkloadNotFound {
            workload_id: workload_id.into(),
        }
    }

    /// Create a prepare failed error
    pub fn prepare_failed(workload_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PrepareFailed {
            workload_id: workload_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a stop process failed error
    pub fn stop_process_failed(workload_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopProcessFailed {
            workload_id: workload_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a process manager error
    pub fn process_manager(reason: impl Into<String>) -> Self {
        Self::ProcessManagerFailed {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check whether the error leaves the pool untouched, meaning the caller
    /// may retry the deployment against the same pool
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableAgent
                | Self::PrepareFailed { .. }
                | Self::DeploySubmissionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::workload_not_found("w-123");
        assert!(err.to_string().contains("w-123"));
    }

    #[test]
    fn test_rejection_message_is_surfaced() {
        let err = Error::DeployRejected {
            workload_id: "w-1".into(),
            message: "oom".into(),
        };
        assert!(err.to_string().contains("oom"));
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::NoAvailableAgent.is_retriable());
        assert!(Error::prepare_failed("w-1", "mount failed").is_retriable());
        assert!(!Error::DeployRejected {
            workload_id: "w-1".into(),
            message: "no".into()
        }
        .is_retriable());
    }
}
