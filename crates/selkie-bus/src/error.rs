//! Error types for bus operations
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Bus errors
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus has been shut down
    #[error("bus closed")]
    Closed,

    /// A request did not receive a reply within the timeout
    #[error("request on subject {subject} timed out after {timeout_ms}ms")]
    RequestTimeout { subject: String, timeout_ms: u64 },

    /// Attempted to respond to a message without a reply subject
    #[error("message on subject {subject} carries no reply subject")]
    NoReplySubject { subject: String },

    /// Subscription was already drained
    #[error("subscription to subject {subject} already drained")]
    AlreadyDrained { subject: String },

    /// Internal error
    #[error("internal bus error: {reason}")]
    Internal { reason: String },
}

impl From<BusError> for selkie_core::Error {
    fn from(err: BusError) -> Self {
        selkie_core::Error::Internal {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BusError::RequestTimeout {
            subject: "foo.bar".to_string(),
            timeout_ms: 250,
        };
        let msg = err.to_string();
        assert!(msg.contains("foo.bar"));
        assert!(msg.contains("250"));
    }
}
