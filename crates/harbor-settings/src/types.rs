//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so partial JSON files are accepted; missing fields take their default.

use harbor_core::LineErrorPolicy;
use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarborSettings {
    /// Query loop defaults.
    pub query: QuerySettings,
    /// Execution-context provisioning defaults.
    pub sandbox: SandboxSettings,
    /// Snapshot behavior.
    pub snapshot: SnapshotSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Query loop defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Upper bound on turns per query.
    pub max_turns: u32,
    /// Model passed to the driven CLI, if any.
    pub model: Option<String>,
    /// Handling of malformed stream lines.
    pub line_error_policy: LineErrorPolicy,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            model: None,
            line_error_policy: LineErrorPolicy::Skip,
        }
    }
}

/// Execution-context provisioning defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    /// Context lifetime budget in milliseconds.
    pub timeout_ms: u64,
    /// Runtime image name.
    pub runtime: String,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// npm package installed into fresh contexts.
    pub cli_package: String,
    /// Executable name of the installed CLI.
    pub cli_binary: String,
    /// Working directory inside the context.
    pub working_directory: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            runtime: "node22".to_string(),
            vcpus: 2,
            cli_package: "@anthropic-ai/claude-code".to_string(),
            cli_binary: "claude".to_string(),
            working_directory: "/vercel/sandbox".to_string(),
        }
    }
}

/// Snapshot behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotSettings {
    /// Snapshot after successful runs when no explicit mode is given.
    pub auto_snapshot: bool,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            auto_snapshot: true,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
