//! Error taxonomy for Harbor.
//!
//! [`HarborError`] has one variant per failure domain. Crate-local error types
//! (`SandboxError`, `StreamError`, `ToolError`, ...) convert into it at crate
//! boundaries, so callers of the message stream only ever match on this enum.
//!
//! Propagation rules:
//! - tool handler and schema failures are folded into tool results and never
//!   surface here during a run;
//! - per-line stream anomalies are skipped or surfaced as [`HarborError::Parse`]
//!   depending on the active line-error policy;
//! - setup, execution, and authentication failures end the run.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout Harbor.
pub type Result<T, E = HarborError> = std::result::Result<T, E>;

/// Coarse classification of a [`HarborError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable credential.
    Authentication,
    /// Execution-context creation or command failure.
    Sandbox,
    /// CLI installation failed inside a fresh context.
    Install,
    /// Driven process exited non-zero.
    Execution,
    /// A context-level operation exceeded its budget.
    Timeout,
    /// A tool handler failed.
    Tool,
    /// Input did not match a schema.
    Validation,
    /// Cancelled via the abort signal.
    Abort,
    /// NDJSON line failed to parse or failed structural validation.
    Parse,
    /// A setup step failed.
    Setup,
    /// Anything not classified above.
    Unknown,
}

impl ErrorKind {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Sandbox => "SANDBOX_ERROR",
            Self::Install => "INSTALL_ERROR",
            Self::Execution => "EXECUTION_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Tool => "TOOL_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Abort => "ABORT_ERROR",
            Self::Parse => "PARSE_ERROR",
            Self::Setup => "SETUP_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which setup step failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step")]
pub enum SetupStep {
    /// Writing setup files.
    Files,
    /// Cloning the repository.
    GitClone,
    /// Installing packages.
    Install,
    /// One of the ordered setup commands.
    Command {
        /// Position in the command list.
        index: usize,
        /// The command line.
        command: String,
    },
    /// The user-supplied setup hook.
    Hook,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files => write!(f, "files"),
            Self::GitClone => write!(f, "git clone"),
            Self::Install => write!(f, "install"),
            Self::Command { index, command } => write!(f, "command #{index} `{command}`"),
            Self::Hook => write!(f, "setup hook"),
        }
    }
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum HarborError {
    /// Neither an API key nor an OAuth token was available.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Execution-context provisioning or command failure.
    #[error("sandbox error: {message}")]
    Sandbox {
        /// Description.
        message: String,
        /// Underlying failure.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Installing the driven CLI failed.
    #[error("failed to install CLI (exit {exit_code}): {stderr}")]
    Install {
        /// Installer exit code.
        exit_code: i32,
        /// Captured diagnostics.
        stderr: String,
    },

    /// The driven process exited non-zero.
    #[error("process exited with code {exit_code}: {stderr}")]
    Execution {
        /// Exit code.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What timed out.
        operation: String,
        /// Budget in milliseconds.
        timeout_ms: u64,
    },

    /// A named tool failed.
    #[error("tool '{tool_name}' failed: {message}")]
    Tool {
        /// Tool name.
        tool_name: String,
        /// Failure description.
        message: String,
    },

    /// Schema validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Cancelled through the abort signal.
    #[error("operation aborted")]
    Abort,

    /// A stream line could not be parsed or validated.
    #[error("parse error: {message}")]
    Parse {
        /// Failure description.
        message: String,
        /// Offending raw line or serialized value.
        line: String,
    },

    /// A setup step failed.
    #[error("setup {step} failed (exit {exit_code}): {stderr}")]
    Setup {
        /// Failing step.
        step: SetupStep,
        /// Exit code (`-1` when the step failed without running a command).
        exit_code: i32,
        /// Captured diagnostics.
        stderr: String,
    },

    /// Wrapped unclassified failure.
    #[error("{message}")]
    Unknown {
        /// Description.
        message: String,
        /// Original error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HarborError {
    /// Sandbox error without an underlying source.
    #[must_use]
    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error as [`HarborError::Unknown`], keeping it as source.
    #[must_use]
    pub fn wrap<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unknown {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Unknown error from a plain message.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            source: None,
        }
    }

    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Sandbox { .. } => ErrorKind::Sandbox,
            Self::Install { .. } => ErrorKind::Install,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Tool { .. } => ErrorKind::Tool,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Abort => ErrorKind::Abort,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Setup { .. } => ErrorKind::Setup,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Whether retrying the failed operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Sandbox)
    }

    /// Whether this error came from the abort signal.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

impl From<serde_json::Error> for HarborError {
    fn from(err: serde_json::Error) -> Self {
        Self::wrap(err)
    }
}

impl From<std::io::Error> for HarborError {
    fn from(err: std::io::Error) -> Self {
        Self::wrap(err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn codes_per_kind() {
        assert_eq!(HarborError::Authentication("x".into()).code(), "AUTHENTICATION_ERROR");
        assert_eq!(HarborError::Abort.code(), "ABORT_ERROR");
        assert_eq!(
            HarborError::Install { exit_code: 1, stderr: String::new() }.code(),
            "INSTALL_ERROR"
        );
        assert_eq!(HarborError::unknown("x").code(), "UNKNOWN_ERROR");
    }

    #[test]
    fn execution_display_includes_exit_code() {
        let err = HarborError::Execution {
            exit_code: 2,
            stderr: "boom".into(),
        };
        assert_eq!(err.to_string(), "process exited with code 2: boom");
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn wrap_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = HarborError::wrap(io);
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn setup_display_names_step() {
        let err = HarborError::Setup {
            step: SetupStep::Command {
                index: 1,
                command: "make".into(),
            },
            exit_code: 2,
            stderr: "no rule".into(),
        };
        assert_eq!(err.to_string(), "setup command #1 `make` failed (exit 2): no rule");
    }

    #[test]
    fn retryable_kinds() {
        assert!(HarborError::sandbox("flaky").is_retryable());
        assert!(
            HarborError::Timeout {
                operation: "create".into(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(!HarborError::Abort.is_retryable());
        assert!(HarborError::Abort.is_abort());
    }

    #[test]
    fn error_kind_serde() {
        assert_eq!(serde_json::to_string(&ErrorKind::Execution).unwrap(), "\"execution\"");
        assert_eq!(ErrorKind::Parse.to_string(), "PARSE_ERROR");
    }
}
