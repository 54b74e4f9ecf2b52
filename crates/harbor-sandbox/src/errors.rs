//! Sandbox error types.

use harbor_core::HarborError;
use thiserror::Error;

/// Errors raised by execution contexts and their providers.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The provider could not create a context.
    #[error("failed to create sandbox: {0}")]
    Create(String),

    /// The requested snapshot does not exist or has expired.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// The context was stopped and accepts no further operations.
    #[error("sandbox {0} is stopped")]
    Stopped(String),

    /// An operation exceeded the context's time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What timed out.
        operation: String,
        /// Budget in milliseconds.
        timeout_ms: u64,
    },

    /// A command could not be started or observed.
    #[error("command failed: {0}")]
    Command(String),

    /// Filesystem failure inside the context.
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SandboxError> for HarborError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Timeout {
                operation,
                timeout_ms,
            } => HarborError::Timeout {
                operation,
                timeout_ms,
            },
            other => HarborError::Sandbox {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::ErrorKind;

    #[test]
    fn timeout_maps_to_timeout_kind() {
        let err: HarborError = SandboxError::Timeout {
            operation: "run_command".into(),
            timeout_ms: 5,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn other_errors_map_to_sandbox_kind() {
        let err: HarborError = SandboxError::Stopped("sbx_1".into()).into();
        assert_eq!(err.kind(), ErrorKind::Sandbox);
        assert_eq!(err.to_string(), "sandbox error: sandbox sbx_1 is stopped");
    }
}
