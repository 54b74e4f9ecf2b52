//! Execution-context traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SandboxError;
use crate::process::CommandProcess;
use crate::types::{Command, CommandOutput, SandboxFile, SandboxOptions, SandboxSnapshot};

/// Quote a path for use in a POSIX shell command line.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// An isolated environment commands run in.
///
/// All methods take `&self`; implementations synchronize internally so one
/// context can be shared between a transport and setup hooks.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Provider-assigned ID.
    fn id(&self) -> &str;

    /// Run a command to completion and capture its output.
    async fn run_command(&self, command: &Command) -> Result<CommandOutput, SandboxError>;

    /// Start a command and return its live output streams.
    async fn spawn_command(&self, command: &Command) -> Result<CommandProcess, SandboxError>;

    /// Write files, creating parent directories as needed.
    async fn write_files(&self, files: &[SandboxFile]) -> Result<(), SandboxError>;

    /// Read a file. `Ok(None)` when it does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SandboxError>;

    /// Create a directory and its parents.
    async fn mkdir(&self, path: &str) -> Result<(), SandboxError> {
        let out = self
            .run_command(&Command::shell(format!("mkdir -p {}", shell_quote(path))))
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(SandboxError::Command(format!("mkdir {path}: {}", out.stderr.trim())))
        }
    }

    /// Whether a file or directory exists.
    async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        let out = self
            .run_command(&Command::shell(format!("test -e {}", shell_quote(path))))
            .await?;
        Ok(out.success())
    }

    /// Stop the context. Stopping twice is a no-op.
    async fn stop(&self) -> Result<(), SandboxError>;

    /// Persist the filesystem and stop the context.
    async fn snapshot(&self) -> Result<SandboxSnapshot, SandboxError>;
}

/// Creates execution contexts.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create a context.
    async fn create(&self, options: &SandboxOptions) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_single_quotes() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
