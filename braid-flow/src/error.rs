//! Byte distribution error types.

use braid_core::ErrorCode;

/// Byte distribution error type.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Invalid configuration.
    #[error("invalid configuration: {name}: {reason}")]
    InvalidConfig {
        /// The offending parameter.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A connection-level HTTP/2 error.
    ///
    /// Writer failures during distribution surface here with
    /// [`ErrorCode::InternalError`].
    #[error("connection error ({code}): {message}")]
    Connection {
        /// The HTTP/2 error code to send in the GOAWAY frame.
        code: ErrorCode,
        /// Human-readable failure description.
        message: String,
    },

    /// An internal scheduling invariant no longer holds.
    ///
    /// Debug builds assert before this is ever constructed; in release the
    /// distributor refuses to keep scheduling on corrupted state.
    #[error("scheduler state corrupted: {details}")]
    CorruptedState {
        /// Which invariant was found broken.
        details: &'static str,
    },
}

/// Result type for byte distribution operations.
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = FlowError::Connection {
            code: ErrorCode::InternalError,
            message: "write failed".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "connection error (INTERNAL_ERROR): write failed"
        );
    }

    #[test]
    fn test_invalid_config_display() {
        let err = FlowError::InvalidConfig {
            name: "allocation_quantum",
            reason: "must be positive",
        };
        let msg = format!("{err}");
        assert!(msg.contains("allocation_quantum"));
        assert!(msg.contains("must be positive"));
    }
}
