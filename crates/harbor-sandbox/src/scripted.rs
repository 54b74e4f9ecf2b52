//! In-memory execution contexts that replay prepared output.
//!
//! Every detached command pops the next [`ScriptedTurn`]; captured commands
//! answer from pattern rules. All commands, files, stops, signals and
//! snapshots are recorded on the provider so callers can inspect what a run
//! did. Contexts created by one provider share a single filesystem.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use harbor_core::SnapshotId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::SandboxError;
use crate::process::{CommandProcess, OutputStream, ProcessControl};
use crate::traits::{Sandbox, SandboxProvider};
use crate::types::{
    Command, CommandOutput, SandboxFile, SandboxOptions, SandboxSnapshot, Signal,
};

/// Output of one detached command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptedTurn {
    /// Stdout chunks, delivered in order.
    pub stdout: Vec<String>,
    /// Stderr content.
    pub stderr: String,
    /// Exit code reported after stdout ends.
    pub exit_code: i32,
    /// Keep stdout open until the process is signalled.
    pub hang: bool,
}

impl ScriptedTurn {
    /// One NDJSON line per value, each delivered as its own chunk.
    pub fn messages<I>(messages: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self {
            stdout: messages.into_iter().map(|m| format!("{m}\n")).collect(),
            ..Self::default()
        }
    }

    /// Deliver `text` verbatim as a single chunk.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            stdout: vec![text.into()],
            ..Self::default()
        }
    }

    /// Deliver stdout as the given chunks.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Set stderr content.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Keep the process alive after stdout until it is signalled.
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    rules: Mutex<Vec<(String, CommandOutput)>>,
    create_error: Mutex<Option<String>>,
    created: Mutex<Vec<SandboxOptions>>,
    commands: Mutex<Vec<Command>>,
    spawned: Mutex<Vec<Command>>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    signals: Mutex<Vec<Signal>>,
    snapshots: Mutex<Vec<SnapshotId>>,
    stops: AtomicUsize,
    next_id: AtomicUsize,
}

/// Provider of [`ScriptedSandbox`] contexts. Cheap to clone; clones share
/// the same script and recordings.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSandboxProvider {
    state: Arc<ScriptState>,
}

impl ScriptedSandboxProvider {
    /// Empty script: detached commands print nothing and exit zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue output for the next detached command.
    #[must_use]
    pub fn with_turn(self, turn: ScriptedTurn) -> Self {
        self.state.turns.lock().push_back(turn);
        self
    }

    /// Queue several turns.
    #[must_use]
    pub fn with_turns<I>(self, turns: I) -> Self
    where
        I: IntoIterator<Item = ScriptedTurn>,
    {
        self.state.turns.lock().extend(turns);
        self
    }

    /// Answer captured commands whose line contains `pattern` with `output`.
    /// Earlier rules win.
    #[must_use]
    pub fn with_command_result(self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.state.rules.lock().push((pattern.into(), output));
        self
    }

    /// Fail every `create` call with `message`.
    #[must_use]
    pub fn with_create_error(self, message: impl Into<String>) -> Self {
        *self.state.create_error.lock() = Some(message.into());
        self
    }

    /// Seed a file.
    #[must_use]
    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let _ = self.state.files.lock().insert(normalize(path), content.into());
        self
    }

    /// Options of every `create` call.
    pub fn created(&self) -> Vec<SandboxOptions> {
        self.state.created.lock().clone()
    }

    /// Every command run, captured or detached, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state.commands.lock().clone()
    }

    /// Command lines of every command run, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.state.commands.lock().iter().map(Command::display_line).collect()
    }

    /// Detached commands only.
    pub fn spawned(&self) -> Vec<Command> {
        self.state.spawned.lock().clone()
    }

    /// Current file contents.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.files.lock().get(&normalize(path)).cloned()
    }

    /// Signals delivered to hanging processes.
    pub fn signals(&self) -> Vec<Signal> {
        self.state.signals.lock().clone()
    }

    /// Snapshots taken.
    pub fn snapshots(&self) -> Vec<SnapshotId> {
        self.state.snapshots.lock().clone()
    }

    /// Number of contexts stopped (snapshots included).
    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    /// Turns not yet consumed.
    pub fn remaining_turns(&self) -> usize {
        self.state.turns.lock().len()
    }
}

#[async_trait]
impl SandboxProvider for ScriptedSandboxProvider {
    async fn create(&self, options: &SandboxOptions) -> Result<Arc<dyn Sandbox>, SandboxError> {
        self.state.created.lock().push(options.clone());
        if let Some(message) = self.state.create_error.lock().clone() {
            return Err(SandboxError::Create(message));
        }
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSandbox {
            id: format!("sbx_scripted_{n}"),
            state: Arc::clone(&self.state),
            stopped: AtomicBool::new(false),
        }))
    }
}

/// A context created by [`ScriptedSandboxProvider`].
#[derive(Debug)]
pub struct ScriptedSandbox {
    id: String,
    state: Arc<ScriptState>,
    stopped: AtomicBool,
}

impl ScriptedSandbox {
    fn ensure_running(&self) -> Result<(), SandboxError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SandboxError::Stopped(self.id.clone()));
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn hold_open(stream: OutputStream, until: CancellationToken) -> OutputStream {
    let tail = futures::stream::once(async move { until.cancelled().await })
        .filter_map(|()| futures::future::ready(None::<std::io::Result<Bytes>>));
    stream.chain(tail).boxed()
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run_command(&self, command: &Command) -> Result<CommandOutput, SandboxError> {
        self.ensure_running()?;
        let line = command.display_line();
        self.state.commands.lock().push(command.clone());
        let output = self
            .state
            .rules
            .lock()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map_or_else(CommandOutput::default, |(_, output)| output.clone());
        debug!(sandbox_id = %self.id, command = %line, exit_code = output.exit_code, "scripted command");
        Ok(output)
    }

    async fn spawn_command(&self, command: &Command) -> Result<CommandProcess, SandboxError> {
        self.ensure_running()?;
        self.state.commands.lock().push(command.clone());
        self.state.spawned.lock().push(command.clone());
        let turn = self.state.turns.lock().pop_front().unwrap_or_default();

        let chunks: Vec<std::io::Result<Bytes>> =
            turn.stdout.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        let stderr: Vec<std::io::Result<Bytes>> = if turn.stderr.is_empty() {
            Vec::new()
        } else {
            vec![Ok(Bytes::from(turn.stderr))]
        };

        let killed = CancellationToken::new();
        let mut stdout = futures::stream::iter(chunks).boxed();
        if turn.hang {
            stdout = hold_open(stdout, killed.clone());
        }

        let (control, mut driver) = ProcessControl::pair();
        let state = Arc::clone(&self.state);
        let exit_code = turn.exit_code;
        let hang = turn.hang;
        let _ = tokio::spawn(async move {
            if !hang {
                driver.finish(Ok(exit_code));
                return;
            }
            let code = match driver.signals.recv().await {
                Some(signal) => {
                    state.signals.lock().push(signal);
                    signal.exit_code()
                }
                None => -1,
            };
            killed.cancel();
            driver.finish(Ok(code));
        });

        Ok(CommandProcess {
            stdout,
            stderr: futures::stream::iter(stderr).boxed(),
            control,
        })
    }

    async fn write_files(&self, files: &[SandboxFile]) -> Result<(), SandboxError> {
        self.ensure_running()?;
        let mut store = self.state.files.lock();
        for file in files {
            let _ = store.insert(normalize(&file.path), file.content.clone());
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        self.ensure_running()?;
        Ok(self.state.files.lock().get(&normalize(path)).cloned())
    }

    async fn mkdir(&self, path: &str) -> Result<(), SandboxError> {
        self.ensure_running()?;
        let _ = self.state.dirs.lock().insert(normalize(path));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        self.ensure_running()?;
        let path = normalize(path);
        let prefix = format!("{path}/");
        let in_files = self
            .state
            .files
            .lock()
            .keys()
            .any(|k| *k == path || k.starts_with(&prefix));
        let in_dirs = self
            .state
            .dirs
            .lock()
            .iter()
            .any(|d| *d == path || d.starts_with(&prefix));
        Ok(in_files || in_dirs)
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.state.stops.fetch_add(1, Ordering::SeqCst);
            debug!(sandbox_id = %self.id, "scripted sandbox stopped");
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<SandboxSnapshot, SandboxError> {
        self.ensure_running()?;
        let id = SnapshotId::new();
        self.state.snapshots.lock().push(id.clone());
        let size = self
            .state
            .files
            .lock()
            .values()
            .map(|c| c.len() as u64)
            .sum();
        self.stop().await?;
        Ok(SandboxSnapshot {
            id,
            size_bytes: Some(size),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
