//! Plain data exchanged with execution contexts.

use std::time::Duration;

use harbor_core::SnapshotId;
use serde::{Deserialize, Serialize};

/// Where a new context's filesystem comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum SandboxSource {
    /// Empty base image.
    #[default]
    Fresh,
    /// Restore a previously taken snapshot.
    Snapshot(SnapshotId),
}

/// Options for creating a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Filesystem source.
    pub source: SandboxSource,
    /// Lifetime budget of the context.
    pub timeout: Duration,
    /// Runtime image name (`node22`, ...).
    pub runtime: String,
    /// Virtual CPU count.
    pub vcpus: u32,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            source: SandboxSource::Fresh,
            timeout: Duration::from_secs(600),
            runtime: "node22".into(),
            vcpus: 2,
        }
    }
}

/// A command to run inside a context.
///
/// Arguments are passed as a vector, never re-parsed by a shell, unless the
/// command was built with [`Command::shell`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Executable.
    pub cmd: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory inside the context.
    pub cwd: Option<String>,
}

impl Command {
    /// Run `cmd` with `args`.
    pub fn new<I, S>(cmd: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Run a command line through `bash -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("bash", ["-c".to_string(), line.into()])
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Human-readable command line, for logs and matching.
    ///
    /// A `bash -c` command displays as its script.
    #[must_use]
    pub fn display_line(&self) -> String {
        if self.cmd == "bash" && self.args.len() == 2 && self.args[0] == "-c" {
            return self.args[1].clone();
        }
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`-1` when killed without one).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given code and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A file to write into a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxFile {
    /// Destination path.
    pub path: String,
    /// Raw contents.
    pub content: Vec<u8>,
}

impl SandboxFile {
    /// Build from a path and any byte-like content.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Result of snapshotting a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxSnapshot {
    /// Snapshot ID, usable as [`SandboxSource::Snapshot`].
    pub id: SnapshotId,
    /// Size in bytes, when known.
    pub size_bytes: Option<u64>,
}

/// Signal delivered to a detached process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// `SIGINT`
    Interrupt,
    /// `SIGTERM`
    Terminate,
    /// `SIGKILL`
    Kill,
}

impl Signal {
    /// Conventional signal name without the `SIG` prefix.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "INT",
            Self::Terminate => "TERM",
            Self::Kill => "KILL",
        }
    }

    /// Exit code a shell reports for a process killed by this signal.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        128 + match self {
            Self::Interrupt => 2,
            Self::Terminate => 15,
            Self::Kill => 9,
        }
    }
}
