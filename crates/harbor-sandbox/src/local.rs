//! Host-backed execution contexts.
//!
//! Each context is a directory under the provider's base directory; commands
//! run as host processes with that directory as their working directory.
//! Paths handed to the context are re-rooted under it, so `/app/main.rs` and
//! `app/main.rs` name the same file. This is a convenience for development
//! and tests, not an isolation boundary.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use harbor_core::SnapshotId;
use tempfile::TempDir;
use tokio::process::Child;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::errors::SandboxError;
use crate::process::{CommandProcess, ProcessControl};
use crate::traits::{Sandbox, SandboxProvider};
use crate::types::{
    Command, CommandOutput, SandboxFile, SandboxOptions, SandboxSnapshot, SandboxSource, Signal,
};

/// Creates [`LocalSandbox`] contexts under a base directory.
#[derive(Debug)]
pub struct LocalSandboxProvider {
    base: PathBuf,
    _temp: Option<TempDir>,
}

impl LocalSandboxProvider {
    /// Use `base` for context and snapshot directories.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            _temp: None,
        }
    }

    /// Use a fresh temporary base directory, removed when the provider drops.
    pub fn temporary() -> Result<Self, SandboxError> {
        let temp = tempfile::Builder::new().prefix("harbor-").tempdir()?;
        Ok(Self {
            base: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.base.join("snapshots")
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    #[instrument(skip_all, fields(source = ?options.source))]
    async fn create(&self, options: &SandboxOptions) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let id = format!("sbx_{}", uuid::Uuid::new_v4().simple());
        let root = self.base.join("sandboxes").join(&id);

        match &options.source {
            SandboxSource::Fresh => {
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|e| SandboxError::Create(format!("{}: {e}", root.display())))?;
            }
            SandboxSource::Snapshot(snapshot_id) => {
                let src = self.snapshots_dir().join(snapshot_id.as_str());
                if !tokio::fs::try_exists(&src).await? {
                    return Err(SandboxError::SnapshotNotFound(snapshot_id.to_string()));
                }
                let _ = copy_tree_blocking(src, root.clone()).await?;
            }
        }

        info!(sandbox_id = %id, root = %root.display(), "local sandbox created");
        Ok(Arc::new(LocalSandbox {
            id,
            root,
            snapshots: self.snapshots_dir(),
            timeout: options.timeout,
            deadline: Instant::now() + options.timeout,
            stopped: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }))
    }
}

/// A context rooted at a host directory.
#[derive(Debug)]
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
    snapshots: PathBuf,
    timeout: Duration,
    deadline: Instant,
    stopped: AtomicBool,
    shutdown: CancellationToken,
}

impl LocalSandbox {
    /// Host directory backing this context.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn ensure_running(&self) -> Result<(), SandboxError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SandboxError::Stopped(self.id.clone()));
        }
        Ok(())
    }

    fn remaining(&self, operation: &str) -> Result<Duration, SandboxError> {
        self.ensure_running()?;
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| SandboxError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.timeout_ms(),
            })
    }

    /// Map a context path onto the host, dropping root and `..` components.
    fn resolve(&self, path: &str) -> PathBuf {
        Path::new(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    async fn build(&self, command: &Command) -> Result<tokio::process::Command, SandboxError> {
        let cwd = command
            .cwd
            .as_deref()
            .map_or_else(|| self.root.clone(), |c| self.resolve(c));
        tokio::fs::create_dir_all(&cwd).await?;

        let mut cmd = tokio::process::Command::new(&command.cmd);
        let _ = cmd
            .args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.env {
            let _ = cmd.env(key, value);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run_command(&self, command: &Command) -> Result<CommandOutput, SandboxError> {
        let line = command.display_line();
        let remaining = self.remaining(&format!("command `{line}`"))?;
        let child = self
            .build(command)
            .await?
            .spawn()
            .map_err(|e| SandboxError::Command(format!("failed to spawn `{line}`: {e}")))?;

        debug!(sandbox_id = %self.id, command = %line, "running command");
        let output = tokio::time::timeout(remaining, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout {
                operation: format!("command `{line}`"),
                timeout_ms: self.timeout_ms(),
            })??;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(sandbox_id = %self.id, command = %line, exit_code, "command finished");
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_command(&self, command: &Command) -> Result<CommandProcess, SandboxError> {
        let line = command.display_line();
        let _ = self.remaining(&format!("command `{line}`"))?;
        let mut child = self
            .build(command)
            .await?
            .spawn()
            .map_err(|e| SandboxError::Command(format!("failed to spawn `{line}`: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Command("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Command("stderr was not captured".into()))?;

        let (control, mut driver) = ProcessControl::pair();
        let shutdown = self.shutdown.child_token();
        let deadline = self.deadline;
        let timeout_ms = self.timeout_ms();
        debug!(sandbox_id = %self.id, command = %line, pid = ?child.id(), "spawned detached command");

        let _ = tokio::spawn(async move {
            let mut killed = false;
            let status = loop {
                tokio::select! {
                    status = child.wait() => {
                        break status.map(|s| s.code().unwrap_or(-1)).map_err(SandboxError::from);
                    }
                    Some(signal) = driver.signals.recv() => deliver(&mut child, signal).await,
                    () = shutdown.cancelled(), if !killed => {
                        killed = true;
                        let _ = child.start_kill();
                    }
                    () = tokio::time::sleep_until(deadline), if !killed => {
                        warn!(command = %line, timeout_ms, "detached command exceeded sandbox timeout");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        break Err(SandboxError::Timeout {
                            operation: format!("command `{line}`"),
                            timeout_ms,
                        });
                    }
                }
            };
            driver.finish(status);
        });

        Ok(CommandProcess {
            stdout: ReaderStream::new(stdout).boxed(),
            stderr: ReaderStream::new(stderr).boxed(),
            control,
        })
    }

    async fn write_files(&self, files: &[SandboxFile]) -> Result<(), SandboxError> {
        self.ensure_running()?;
        for file in files {
            let path = self.resolve(&file.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &file.content).await?;
            debug!(sandbox_id = %self.id, path = %file.path, bytes = file.content.len(), "wrote file");
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        self.ensure_running()?;
        match tokio::fs::read(self.resolve(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), SandboxError> {
        self.ensure_running()?;
        tokio::fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        self.ensure_running()?;
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(sandbox_id = %self.id, "local sandbox stopped");
        Ok(())
    }

    async fn snapshot(&self) -> Result<SandboxSnapshot, SandboxError> {
        self.ensure_running()?;
        let id = SnapshotId::new();
        let dest = self.snapshots.join(id.as_str());
        let size = copy_tree_blocking(self.root.clone(), dest).await?;
        self.stop().await?;
        info!(sandbox_id = %self.id, snapshot_id = %id, size_bytes = size, "snapshot created");
        Ok(SandboxSnapshot {
            id,
            size_bytes: Some(size),
        })
    }
}

async fn deliver(child: &mut Child, signal: Signal) {
    if signal == Signal::Kill {
        let _ = child.start_kill();
        return;
    }
    let Some(pid) = child.id() else {
        return;
    };
    let sent = tokio::process::Command::new("kill")
        .arg(format!("-{}", signal.name()))
        .arg(pid.to_string())
        .status()
        .await;
    match sent {
        Ok(status) if status.success() => debug!(pid, signal = signal.name(), "signal delivered"),
        other => {
            warn!(pid, signal = signal.name(), result = ?other, "signal delivery failed, killing");
            let _ = child.start_kill();
        }
    }
}

async fn copy_tree_blocking(src: PathBuf, dest: PathBuf) -> Result<u64, SandboxError> {
    tokio::task::spawn_blocking(move || copy_tree(&src, &dest))
        .await
        .map_err(|e| SandboxError::Command(format!("copy task failed: {e}")))?
        .map_err(SandboxError::from)
}

/// Copy regular files and directories from `src` into `dest`, returning the
/// number of bytes copied. Symlinks are skipped.
fn copy_tree(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            total += std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(total)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    async fn fresh(provider: &LocalSandboxProvider) -> Arc<dyn Sandbox> {
        provider.create(&SandboxOptions::default()).await.unwrap()
    }

    async fn read_all(mut stream: crate::process::OutputStream) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn run_command_captures_output() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        let out = sandbox
            .run_command(&Command::shell("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn command_env_and_cwd() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        let out = sandbox
            .run_command(&Command::shell("echo $GREETING; pwd").env("GREETING", "hi").cwd("/work/dir"))
            .await
            .unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("hi"));
        assert!(lines.next().unwrap().ends_with("work/dir"));
    }

    #[tokio::test]
    async fn files_roundtrip_and_stay_rooted() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        sandbox
            .write_files(&[SandboxFile::new("/app/../../etc/hosts", "local")])
            .await
            .unwrap();
        assert_eq!(
            sandbox.read_file("app/etc/hosts").await.unwrap().as_deref(),
            Some(b"local".as_slice())
        );
        assert!(!provider.base().join("etc").exists());
        assert_eq!(sandbox.read_file("missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn mkdir_and_exists() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        assert!(!sandbox.exists("a/b").await.unwrap());
        sandbox.mkdir("a/b").await.unwrap();
        assert!(sandbox.exists("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn spawn_streams_output_and_exit_code() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        let process = sandbox
            .spawn_command(&Command::shell("printf 'a\\nb\\n'; echo err >&2; exit 4"))
            .await
            .unwrap();
        let (stdout, stderr) = tokio::join!(read_all(process.stdout), read_all(process.stderr));
        assert_eq!(stdout, "a\nb\n");
        assert_eq!(stderr.trim(), "err");
        assert_eq!(process.control.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn terminate_signal_stops_process() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        let mut process = sandbox
            .spawn_command(&Command::new("sleep", ["30"]))
            .await
            .unwrap();
        process.control.kill(Signal::Terminate);
        let code = tokio::time::timeout(Duration::from_secs(5), process.control.wait())
            .await
            .expect("process should exit after SIGTERM")
            .unwrap();
        assert_ne!(code, 0);
    }

    #[tokio::test]
    async fn snapshot_restores_files_and_stops_source() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        sandbox
            .write_files(&[SandboxFile::new("state.txt", "v1")])
            .await
            .unwrap();
        let snap = sandbox.snapshot().await.unwrap();
        assert_eq!(snap.size_bytes, Some(2));
        assert_matches!(
            sandbox.read_file("state.txt").await,
            Err(SandboxError::Stopped(_))
        );

        let restored = provider
            .create(&SandboxOptions {
                source: SandboxSource::Snapshot(snap.id),
                ..SandboxOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(
            restored.read_file("state.txt").await.unwrap().as_deref(),
            Some(b"v1".as_slice())
        );
    }

    #[tokio::test]
    async fn unknown_snapshot_is_rejected() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let err = provider
            .create(&SandboxOptions {
                source: SandboxSource::Snapshot(SnapshotId::from("snap_missing")),
                ..SandboxOptions::default()
            })
            .await
            .err().unwrap();
        assert_matches!(err, SandboxError::SnapshotNotFound(id) if id == "snap_missing");
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = fresh(&provider).await;
        sandbox.stop().await.unwrap();
        sandbox.stop().await.unwrap();
        assert_matches!(
            sandbox.run_command(&Command::shell("true")).await,
            Err(SandboxError::Stopped(_))
        );
    }

    #[tokio::test]
    async fn expired_context_times_out() {
        let provider = LocalSandboxProvider::temporary().unwrap();
        let sandbox = provider
            .create(&SandboxOptions {
                timeout: Duration::from_millis(100),
                ..SandboxOptions::default()
            })
            .await
            .unwrap();
        let err = sandbox
            .run_command(&Command::new("sleep", ["5"]))
            .await
            .unwrap_err();
        assert_matches!(err, SandboxError::Timeout { timeout_ms: 100, .. });
    }
}
