//! Connection and per-turn options.

use std::time::Duration;

use harbor_core::{LineErrorPolicy, SnapshotId};
use harbor_sandbox::{SandboxOptions, SandboxSource};
use harbor_settings::{HarborSettings, SandboxSettings};
use tokio_util::sync::CancellationToken;

/// How to provision the execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Fresh context or restore from a snapshot.
    pub source: SandboxSource,
    /// Context lifetime budget.
    pub timeout: Duration,
    /// Runtime image name.
    pub runtime: String,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// npm package providing the CLI.
    pub cli_package: String,
    /// CLI executable name.
    pub cli_binary: String,
    /// Working directory for the CLI.
    pub working_directory: String,
    /// Install the CLI into fresh contexts. Snapshots never reinstall.
    pub install_cli: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::from_sandbox_settings(&SandboxSettings::default())
    }
}

impl ConnectOptions {
    /// Seed options from loaded settings.
    pub fn from_settings(settings: &HarborSettings) -> Self {
        Self::from_sandbox_settings(&settings.sandbox)
    }

    fn from_sandbox_settings(sandbox: &SandboxSettings) -> Self {
        Self {
            source: SandboxSource::Fresh,
            timeout: Duration::from_millis(sandbox.timeout_ms),
            runtime: sandbox.runtime.clone(),
            vcpus: sandbox.vcpus,
            cli_package: sandbox.cli_package.clone(),
            cli_binary: sandbox.cli_binary.clone(),
            working_directory: sandbox.working_directory.clone(),
            install_cli: true,
        }
    }

    /// Restore from `snapshot_id` instead of provisioning fresh.
    #[must_use]
    pub fn restore(mut self, snapshot_id: SnapshotId) -> Self {
        self.source = SandboxSource::Snapshot(snapshot_id);
        self
    }

    /// Snapshot being restored, if any.
    pub fn snapshot_id(&self) -> Option<&SnapshotId> {
        match &self.source {
            SandboxSource::Snapshot(id) => Some(id),
            SandboxSource::Fresh => None,
        }
    }

    pub(crate) fn sandbox_options(&self) -> SandboxOptions {
        SandboxOptions {
            source: self.source.clone(),
            timeout: self.timeout,
            runtime: self.runtime.clone(),
            vcpus: self.vcpus,
        }
    }
}

/// Options for one CLI invocation.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Model override.
    pub model: Option<String>,
    /// Handling of malformed stdout lines.
    pub line_error_policy: LineErrorPolicy,
    /// Cancelling sends `SIGTERM` to the process and ends the stream with an
    /// abort error.
    pub cancel: Option<CancellationToken>,
    /// Extra CLI arguments placed before the prompt.
    pub extra_args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let mut settings = HarborSettings::default();
        settings.sandbox.timeout_ms = 5_000;
        settings.sandbox.cli_binary = "claude-dev".into();
        let opts = ConnectOptions::from_settings(&settings);
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.cli_binary, "claude-dev");
        assert!(opts.install_cli);
        assert_eq!(opts.source, SandboxSource::Fresh);
    }

    #[test]
    fn snapshot_source() {
        let opts = ConnectOptions::default().restore(SnapshotId::from("snap_1"));
        assert_eq!(opts.snapshot_id().map(|id| id.as_str()), Some("snap_1"));
        assert_eq!(
            opts.sandbox_options().source,
            SandboxSource::Snapshot(SnapshotId::from("snap_1"))
        );
    }
}
