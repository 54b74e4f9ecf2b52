//! Options for one query run.

use std::future::Future;
use std::sync::Arc;

use harbor_core::{LineErrorPolicy, SnapshotId};
use harbor_sandbox::SandboxProvider;
use harbor_settings::HarborSettings;
use harbor_tools::ToolDefinition;
use harbor_transport::{ConnectOptions, Credentials};

use crate::hooks::{
    ErrorSummary, FnSetupErrorHook, FnSetupHook, FnTeardownHook, HookError, Hooks, RunOutcome,
    SandboxScope, SetupErrorHook, SetupHook, TeardownHook,
};
use crate::setup::SetupOptions;
use crate::snapshot::{SnapshotLedger, SnapshotOptions};

/// Everything a query run needs besides the prompt.
///
/// Explicit builder calls always win over the settings the options were
/// seeded from.
#[derive(Clone)]
pub struct QueryOptions {
    /// Creates the execution context.
    pub provider: Arc<dyn SandboxProvider>,
    /// Upper bound on CLI invocations.
    pub max_turns: u32,
    /// Model passed to the CLI.
    pub model: Option<String>,
    /// Tools the model may request. Names must be unique.
    pub tools: Vec<ToolDefinition>,
    /// Explicit credentials. Missing ones are read from the environment.
    pub credentials: Credentials,
    /// Provisioning.
    pub connect: ConnectOptions,
    /// Shorthand setup.
    pub setup: SetupOptions,
    /// Lifecycle hooks.
    pub hooks: Hooks,
    /// Advanced snapshot policy. Overrides `auto_snapshot` when set.
    pub snapshot: Option<SnapshotOptions>,
    /// Snapshot after a successful run when no advanced policy is set.
    pub auto_snapshot: bool,
    /// Handling of malformed stream lines.
    pub line_error_policy: LineErrorPolicy,
    /// Run a turn's tool requests concurrently.
    pub parallel_tools: bool,
    /// Where automatic snapshots are recorded.
    pub ledger: SnapshotLedger,
    /// Extra CLI arguments.
    pub extra_args: Vec<String>,
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("tools", &self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("credentials", &self.credentials)
            .field("connect", &self.connect)
            .field("setup", &self.setup)
            .field("hooks", &self.hooks)
            .field("snapshot", &self.snapshot)
            .field("auto_snapshot", &self.auto_snapshot)
            .field("line_error_policy", &self.line_error_policy)
            .field("parallel_tools", &self.parallel_tools)
            .finish_non_exhaustive()
    }
}

impl QueryOptions {
    /// Defaults over `provider`.
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self::from_settings(&HarborSettings::default(), provider)
    }

    /// Seed options from loaded settings.
    pub fn from_settings(settings: &HarborSettings, provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            provider,
            max_turns: settings.query.max_turns.max(1),
            model: settings.query.model.clone(),
            tools: Vec::new(),
            credentials: Credentials::new(),
            connect: ConnectOptions::from_settings(settings),
            setup: SetupOptions::default(),
            hooks: Hooks::default(),
            snapshot: None,
            auto_snapshot: settings.snapshot.auto_snapshot,
            line_error_policy: settings.query.line_error_policy,
            parallel_tools: false,
            ledger: SnapshotLedger::new(),
            extra_args: Vec::new(),
        }
    }

    /// Set the turn budget (at least one).
    #[must_use]
    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a tool.
    #[must_use]
    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add several tools.
    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Set explicit credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replace provisioning options.
    #[must_use]
    pub fn connect(mut self, connect: ConnectOptions) -> Self {
        self.connect = connect;
        self
    }

    /// Start from a snapshot instead of a fresh context.
    #[must_use]
    pub fn resume_from(mut self, snapshot_id: SnapshotId) -> Self {
        self.connect = self.connect.restore(snapshot_id);
        self
    }

    /// Set shorthand setup.
    #[must_use]
    pub fn setup(mut self, setup: SetupOptions) -> Self {
        self.setup = setup;
        self
    }

    /// Register a setup hook closure.
    #[must_use]
    pub fn on_setup<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(SandboxScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.with_setup_hook(FnSetupHook(hook))
    }

    /// Register a setup hook.
    #[must_use]
    pub fn with_setup_hook(mut self, hook: impl SetupHook + 'static) -> Self {
        self.hooks.setup = Some(Arc::new(hook));
        self
    }

    /// Register a setup-error hook closure.
    #[must_use]
    pub fn on_setup_error<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(SandboxScope, ErrorSummary) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.with_setup_error_hook(FnSetupErrorHook(hook))
    }

    /// Register a setup-error hook.
    #[must_use]
    pub fn with_setup_error_hook(mut self, hook: impl SetupErrorHook + 'static) -> Self {
        self.hooks.setup_error = Some(Arc::new(hook));
        self
    }

    /// Register a teardown hook closure.
    #[must_use]
    pub fn on_teardown<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(SandboxScope, RunOutcome) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.with_teardown_hook(FnTeardownHook(hook))
    }

    /// Register a teardown hook.
    #[must_use]
    pub fn with_teardown_hook(mut self, hook: impl TeardownHook + 'static) -> Self {
        self.hooks.teardown = Some(Arc::new(hook));
        self
    }

    /// Set the advanced snapshot policy.
    #[must_use]
    pub fn snapshot(mut self, snapshot: SnapshotOptions) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Set the simple snapshot flag.
    #[must_use]
    pub fn auto_snapshot(mut self, enabled: bool) -> Self {
        self.auto_snapshot = enabled;
        self
    }

    /// Set the malformed-line policy.
    #[must_use]
    pub fn line_error_policy(mut self, policy: LineErrorPolicy) -> Self {
        self.line_error_policy = policy;
        self
    }

    /// Dispatch a turn's tool requests concurrently.
    #[must_use]
    pub fn parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    /// Record automatic snapshots in `ledger`.
    #[must_use]
    pub fn ledger(mut self, ledger: SnapshotLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Append extra CLI arguments.
    #[must_use]
    pub fn extra_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_sandbox::{SandboxSource, ScriptedSandboxProvider};

    fn provider() -> Arc<dyn SandboxProvider> {
        Arc::new(ScriptedSandboxProvider::new())
    }

    #[test]
    fn seeded_from_settings() {
        let mut settings = HarborSettings::default();
        settings.query.max_turns = 4;
        settings.query.model = Some("haiku".into());
        settings.query.line_error_policy = LineErrorPolicy::Fail;
        settings.snapshot.auto_snapshot = false;
        let opts = QueryOptions::from_settings(&settings, provider());
        assert_eq!(opts.max_turns, 4);
        assert_eq!(opts.model.as_deref(), Some("haiku"));
        assert_eq!(opts.line_error_policy, LineErrorPolicy::Fail);
        assert!(!opts.auto_snapshot);
    }

    #[test]
    fn explicit_values_win() {
        let mut settings = HarborSettings::default();
        settings.query.max_turns = 4;
        let opts = QueryOptions::from_settings(&settings, provider())
            .max_turns(0)
            .model("opus")
            .resume_from(SnapshotId::from("snap_x"));
        assert_eq!(opts.max_turns, 1);
        assert_eq!(opts.model.as_deref(), Some("opus"));
        assert_eq!(opts.connect.source, SandboxSource::Snapshot(SnapshotId::from("snap_x")));
    }

    #[test]
    fn defaults() {
        let opts = QueryOptions::new(provider());
        assert_eq!(opts.max_turns, 10);
        assert!(opts.auto_snapshot);
        assert!(opts.snapshot.is_none());
        assert!(!opts.parallel_tools);
        assert!(opts.tools.is_empty());
    }
}
