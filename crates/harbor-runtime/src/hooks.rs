//! Setup, setup-error, and teardown hooks.
//!
//! Hooks see the execution context only through [`SandboxScope`], which
//! exposes commands and file access but not lifecycle control: a hook can
//! never stop or snapshot the context it runs in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harbor_core::{ErrorKind, HarborError};
use harbor_sandbox::{Command, CommandOutput, Sandbox, SandboxError, SandboxFile};
use serde::Serialize;

/// Error type hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Capability handle over a running context.
#[derive(Clone)]
pub struct SandboxScope {
    sandbox: Arc<dyn Sandbox>,
    working_directory: String,
}

impl std::fmt::Debug for SandboxScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxScope")
            .field("sandbox_id", &self.sandbox.id())
            .field("working_directory", &self.working_directory)
            .finish()
    }
}

impl SandboxScope {
    pub(crate) fn new(sandbox: Arc<dyn Sandbox>, working_directory: impl Into<String>) -> Self {
        Self {
            sandbox,
            working_directory: working_directory.into(),
        }
    }

    /// Context ID.
    pub fn id(&self) -> &str {
        self.sandbox.id()
    }

    /// Working directory commands default to.
    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    /// Run a shell command line in the working directory.
    pub async fn run(&self, line: impl Into<String>) -> Result<CommandOutput, SandboxError> {
        let command = Command::shell(line).cwd(self.working_directory.as_str());
        self.sandbox.run_command(&command).await
    }

    /// Run an explicit command. Its own `cwd` wins over the working directory.
    pub async fn run_command(&self, command: Command) -> Result<CommandOutput, SandboxError> {
        let command = if command.cwd.is_some() {
            command
        } else {
            command.cwd(self.working_directory.as_str())
        };
        self.sandbox.run_command(&command).await
    }

    /// Write files.
    pub async fn write_files(&self, files: &[SandboxFile]) -> Result<(), SandboxError> {
        self.sandbox.write_files(files).await
    }

    /// Read a file, `None` when absent.
    pub async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        self.sandbox.read_file(path).await
    }

    /// Whether a path exists.
    pub async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        self.sandbox.exists(path).await
    }

    /// Create a directory and its parents.
    pub async fn mkdir(&self, path: &str) -> Result<(), SandboxError> {
        self.sandbox.mkdir(path).await
    }
}

/// Cloneable summary of a failure, handed to hooks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    /// Classification.
    pub kind: ErrorKind,
    /// Machine code.
    pub code: String,
    /// Display text.
    pub message: String,
}

impl From<&HarborError> for ErrorSummary {
    fn from(err: &HarborError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

/// How a run ended, handed to the teardown hook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Whether the run completed without error or interruption.
    pub success: bool,
    /// Failure, when there was one.
    pub error: Option<ErrorSummary>,
    /// Wall-clock run time.
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    /// Messages delivered to the caller.
    pub message_count: usize,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_millis())
}

/// Runs after shorthand setup, before the first turn.
#[async_trait]
pub trait SetupHook: Send + Sync {
    /// Prepare the context. An error aborts the run.
    async fn setup(&self, scope: &SandboxScope) -> Result<(), HookError>;
}

/// Runs when setup fails. Best-effort.
#[async_trait]
pub trait SetupErrorHook: Send + Sync {
    /// Observe the failure.
    async fn on_setup_error(&self, scope: &SandboxScope, error: &ErrorSummary);
}

/// Runs after the run, while the context is still connected.
#[async_trait]
pub trait TeardownHook: Send + Sync {
    /// Observe the outcome. Errors are logged and ignored.
    async fn teardown(&self, scope: &SandboxScope, outcome: &RunOutcome) -> Result<(), HookError>;
}

pub(crate) struct FnSetupHook<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> SetupHook for FnSetupHook<F>
where
    F: Fn(SandboxScope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    async fn setup(&self, scope: &SandboxScope) -> Result<(), HookError> {
        (self.0)(scope.clone()).await
    }
}

pub(crate) struct FnSetupErrorHook<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> SetupErrorHook for FnSetupErrorHook<F>
where
    F: Fn(SandboxScope, ErrorSummary) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn on_setup_error(&self, scope: &SandboxScope, error: &ErrorSummary) {
        (self.0)(scope.clone(), error.clone()).await;
    }
}

pub(crate) struct FnTeardownHook<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> TeardownHook for FnTeardownHook<F>
where
    F: Fn(SandboxScope, RunOutcome) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    async fn teardown(&self, scope: &SandboxScope, outcome: &RunOutcome) -> Result<(), HookError> {
        (self.0)(scope.clone(), outcome.clone()).await
    }
}

/// Hooks registered for a run.
#[derive(Clone, Default)]
pub struct Hooks {
    /// After shorthand setup.
    pub setup: Option<Arc<dyn SetupHook>>,
    /// When setup fails.
    pub setup_error: Option<Arc<dyn SetupErrorHook>>,
    /// After the run.
    pub teardown: Option<Arc<dyn TeardownHook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("setup", &self.setup.is_some())
            .field("setup_error", &self.setup_error.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}
