//! One execution context driving the CLI, one process per turn.
//!
//! Connectivity is monotonic: `Disconnected -> Connected -> Closed`. A closed
//! transport never reconnects. Snapshotting stops the context and closes the
//! transport as a side effect.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures::{Stream, StreamExt};
use harbor_core::{HarborError, Message, SessionId, SnapshotRecord};
use harbor_sandbox::{CommandProcess, Sandbox, SandboxProvider, Signal};
use harbor_stream::{StreamError, enrich_stream, parse_process_output};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::command::{cli_command, install_command};
use crate::credentials::Credentials;
use crate::options::{ConnectOptions, SessionOptions};

/// Enriched messages of one CLI invocation.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, HarborError>> + Send>>;

/// Observable connectivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connected (or a connect is in flight).
    Disconnected,
    /// Holding a live context.
    Connected,
    /// Released. Terminal.
    Closed,
}

struct Connection {
    sandbox: Arc<dyn Sandbox>,
    session_id: SessionId,
    credentials: Credentials,
    options: ConnectOptions,
}

enum State {
    Disconnected,
    Connecting,
    Connected(Connection),
    Closed,
}

/// Owns one execution context and runs the CLI in it.
pub struct Transport {
    provider: Arc<dyn SandboxProvider>,
    state: Mutex<State>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

async fn stop_quietly(sandbox: &dyn Sandbox) {
    if let Err(e) = sandbox.stop().await {
        warn!(sandbox_id = sandbox.id(), error = %e, "failed to stop sandbox");
    }
}

enum Step {
    Cancelled,
    Item(Option<Result<Message, StreamError>>),
}

impl Transport {
    /// Create a disconnected transport over `provider`.
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(State::Disconnected),
        }
    }

    /// Current connectivity.
    pub fn state(&self) -> ConnectionState {
        match &*self.state.lock() {
            State::Disconnected | State::Connecting => ConnectionState::Disconnected,
            State::Connected(_) => ConnectionState::Connected,
            State::Closed => ConnectionState::Closed,
        }
    }

    /// Whether a context is held.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Session ID of the live connection.
    pub fn session_id(&self) -> Option<SessionId> {
        match &*self.state.lock() {
            State::Connected(conn) => Some(conn.session_id.clone()),
            _ => None,
        }
    }

    /// The live context, for setup and teardown work.
    pub fn sandbox(&self) -> Option<Arc<dyn Sandbox>> {
        match &*self.state.lock() {
            State::Connected(conn) => Some(Arc::clone(&conn.sandbox)),
            _ => None,
        }
    }

    /// Provision a context and install the CLI into it.
    ///
    /// Connecting an already connected transport returns the existing
    /// session ID.
    #[instrument(skip_all, fields(runtime = %options.runtime, snapshot_id = ?options.snapshot_id()))]
    pub async fn connect(
        &self,
        credentials: Credentials,
        options: ConnectOptions,
    ) -> Result<SessionId, HarborError> {
        credentials.ensure_present()?;
        {
            let mut state = self.state.lock();
            match &*state {
                State::Disconnected => {}
                State::Connecting => return Err(HarborError::sandbox("connect already in progress")),
                State::Connected(conn) => return Ok(conn.session_id.clone()),
                State::Closed => return Err(HarborError::sandbox("transport is closed")),
            }
            *state = State::Connecting;
        }

        let sandbox = match self.provision(&options).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                let mut state = self.state.lock();
                if matches!(*state, State::Connecting) {
                    *state = State::Disconnected;
                }
                return Err(e);
            }
        };

        let session_id = SessionId::new();
        let closed_meanwhile = {
            let mut state = self.state.lock();
            if matches!(*state, State::Closed) {
                true
            } else {
                *state = State::Connected(Connection {
                    sandbox: Arc::clone(&sandbox),
                    session_id: session_id.clone(),
                    credentials,
                    options,
                });
                false
            }
        };
        if closed_meanwhile {
            stop_quietly(sandbox.as_ref()).await;
            return Err(HarborError::sandbox("transport closed while connecting"));
        }

        info!(session_id = %session_id, sandbox_id = sandbox.id(), "transport connected");
        Ok(session_id)
    }

    async fn provision(&self, options: &ConnectOptions) -> Result<Arc<dyn Sandbox>, HarborError> {
        let sandbox = self.provider.create(&options.sandbox_options()).await?;
        debug!(sandbox_id = sandbox.id(), "sandbox created");
        if options.snapshot_id().is_some() || !options.install_cli {
            return Ok(sandbox);
        }

        let output = match sandbox.run_command(&install_command(options)).await {
            Ok(output) => output,
            Err(e) => {
                stop_quietly(sandbox.as_ref()).await;
                return Err(e.into());
            }
        };
        if !output.success() {
            warn!(exit_code = output.exit_code, package = %options.cli_package, "cli install failed");
            stop_quietly(sandbox.as_ref()).await;
            return Err(HarborError::Install {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        debug!(package = %options.cli_package, "cli installed");
        Ok(sandbox)
    }

    /// Run the CLI once with `prompt` and stream its messages.
    ///
    /// Nothing runs until the stream is first polled. Messages are yielded
    /// as soon as their line is complete. A non-zero exit ends the stream
    /// with [`HarborError::Execution`]; cancellation sends `SIGTERM` and ends
    /// it with [`HarborError::Abort`]. Dropping the stream while the process
    /// is still running also sends `SIGTERM`.
    pub fn start_session(&self, prompt: &str, options: SessionOptions) -> MessageStream {
        let prepared = match &*self.state.lock() {
            State::Connected(conn) => Ok((
                Arc::clone(&conn.sandbox),
                conn.session_id.clone(),
                cli_command(&conn.options, &options, &conn.credentials, prompt),
            )),
            _ => Err(HarborError::sandbox("transport is not connected")),
        };

        Box::pin(async_stream::stream! {
            let (sandbox, session_id, command) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let cancel = options.cancel.unwrap_or_default();
            if cancel.is_cancelled() {
                yield Err(HarborError::Abort);
                return;
            }

            debug!(session_id = %session_id, "starting cli process");
            let CommandProcess { stdout, stderr, control } = match sandbox.spawn_command(&command).await {
                Ok(process) => process,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            let mut control = control.kill_on_drop(true);
            let (lines, drain) = parse_process_output(stdout, stderr);
            let messages = enrich_stream(lines, session_id.clone(), options.line_error_policy);
            futures::pin_mut!(messages);

            let mut count = 0usize;
            loop {
                let step = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Step::Cancelled,
                    item = messages.next() => Step::Item(item),
                };
                match step {
                    Step::Cancelled => {
                        warn!(session_id = %session_id, "cancelled, terminating cli process");
                        control.kill(Signal::Terminate);
                        yield Err(HarborError::Abort);
                        return;
                    }
                    Step::Item(Some(Ok(message))) => {
                        count += 1;
                        yield Ok(message);
                    }
                    Step::Item(Some(Err(e))) => {
                        warn!(session_id = %session_id, error = %e, "stream failed, terminating cli process");
                        control.kill(Signal::Terminate);
                        yield Err(e.into());
                        return;
                    }
                    Step::Item(None) => break,
                }
            }

            let status = control.wait().await;
            let stderr = drain.finish().await;
            if cancel.is_cancelled() {
                yield Err(HarborError::Abort);
                return;
            }
            match status {
                Ok(0) => debug!(session_id = %session_id, messages = count, "cli process finished"),
                Ok(exit_code) => {
                    warn!(session_id = %session_id, exit_code, "cli process failed");
                    yield Err(HarborError::Execution { exit_code, stderr });
                }
                Err(e) => yield Err(e.into()),
            }
        })
    }

    /// Snapshot the context. Stops it and closes this transport.
    #[instrument(skip(self))]
    pub async fn create_snapshot(&self) -> Result<SnapshotRecord, HarborError> {
        let conn = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Closed) {
                State::Connected(conn) => conn,
                other => {
                    *state = other;
                    return Err(HarborError::sandbox("cannot snapshot: transport is not connected"));
                }
            }
        };

        let snapshot = match conn.sandbox.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stop_quietly(conn.sandbox.as_ref()).await;
                return Err(e.into());
            }
        };
        let record = SnapshotRecord::new(
            snapshot.id,
            conn.session_id,
            Utc::now(),
            snapshot.size_bytes,
            conn.options.snapshot_id().cloned(),
        );
        info!(snapshot_id = %record.id, session_id = %record.session_id, "snapshot created");
        Ok(record)
    }

    /// Release the context. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), HarborError> {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Closed);
        if let State::Connected(conn) = previous {
            conn.sandbox.stop().await?;
            info!(session_id = %conn.session_id, "transport closed");
        }
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let State::Connected(conn) = std::mem::replace(self.state.get_mut(), State::Closed) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(session_id = %conn.session_id, "releasing sandbox of dropped transport");
                let _ = handle.spawn(async move { stop_quietly(conn.sandbox.as_ref()).await });
            }
            Err(_) => warn!(session_id = %conn.session_id, "transport dropped outside a runtime, sandbox left running"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use harbor_core::{LineErrorPolicy, SnapshotId};
    use harbor_sandbox::{CommandOutput, SandboxSource, ScriptedSandboxProvider, ScriptedTurn};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn creds() -> Credentials {
        Credentials::new().with_api_key("sk-test")
    }

    fn transport(provider: &ScriptedSandboxProvider) -> Transport {
        Transport::new(Arc::new(provider.clone()))
    }

    async fn drain(stream: MessageStream) -> Vec<Result<Message, HarborError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn connect_requires_credentials() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        assert_matches!(
            t.connect(Credentials::new(), ConnectOptions::default()).await,
            Err(HarborError::Authentication(_))
        );
        assert!(provider.created().is_empty());
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn fresh_connect_installs_cli() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        let session_id = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        assert!(session_id.starts_with("session_"));
        assert_eq!(t.session_id(), Some(session_id));
        assert!(t.is_connected());
        assert_eq!(provider.command_lines(), vec!["npm install -g @anthropic-ai/claude-code"]);
    }

    #[tokio::test]
    async fn snapshot_connect_skips_install() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        let opts = ConnectOptions::default().restore(SnapshotId::from("snap_prev"));
        let _ = t.connect(creds(), opts).await.unwrap();
        assert!(provider.command_lines().is_empty());
        assert_eq!(
            provider.created()[0].source,
            SandboxSource::Snapshot(SnapshotId::from("snap_prev"))
        );
    }

    #[tokio::test]
    async fn install_failure_is_distinct() {
        let provider = ScriptedSandboxProvider::new()
            .with_command_result("npm install", CommandOutput::failed(243, "EACCES"));
        let t = transport(&provider);
        let err = t.connect(creds(), ConnectOptions::default()).await.unwrap_err();
        assert_matches!(err, HarborError::Install { exit_code: 243, ref stderr } if stderr == "EACCES");
        assert_eq!(provider.stop_count(), 1);
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn provisioning_failure_is_sandbox_error() {
        let provider = ScriptedSandboxProvider::new().with_create_error("quota exceeded");
        let t = transport(&provider);
        let err = t.connect(creds(), ConnectOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "SANDBOX_ERROR");
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn streams_enriched_messages_and_skips_garbage() {
        let provider = ScriptedSandboxProvider::new().with_turn(ScriptedTurn::chunks([
            "{\"type\":\"system\",\"subtype\":\"init\"}\nnot json\n{\"type\":\"assis",
            "tant\",\"message\":{\"role\":\"assistant\",\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}\n",
            "{\"type\":\"mystery\"}\n{\"type\":\"result\",\"result\":\"hi\"}",
        ]));
        let t = transport(&provider);
        let session_id = t.connect(creds(), ConnectOptions::default()).await.unwrap();

        let messages: Vec<Message> = drain(t.start_session("say hi", SessionOptions::default()))
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.session_id() == &session_id));
        assert_eq!(messages[1].assistant_text().as_deref(), Some("hi"));
        assert_matches!(&messages[2], Message::Result(r) if r.subtype == "success");

        let spawned = provider.spawned();
        assert_eq!(spawned[0].args.last().map(String::as_str), Some("say hi"));
        assert!(spawned[0].env.iter().any(|(k, _)| k == "ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn fail_policy_surfaces_parse_errors() {
        let provider = ScriptedSandboxProvider::new().with_turn(ScriptedTurn::raw(
            "{\"type\":\"system\",\"subtype\":\"init\"}\n{broken\n{\"type\":\"result\"}\n",
        ));
        let t = transport(&provider);
        let _ = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        let options = SessionOptions {
            line_error_policy: LineErrorPolicy::Fail,
            ..SessionOptions::default()
        };
        let items = drain(t.start_session("x", options)).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_matches!(&items[1], Err(HarborError::Parse { line, .. }) if line == "{broken");
    }

    #[tokio::test]
    async fn nonzero_exit_is_execution_error() {
        let provider = ScriptedSandboxProvider::new().with_turn(
            ScriptedTurn::messages([json!({"type": "system", "subtype": "init"})])
                .with_exit_code(2)
                .with_stderr("rate limited"),
        );
        let t = transport(&provider);
        let _ = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        let items = drain(t.start_session("x", SessionOptions::default())).await;
        assert_eq!(items.len(), 2);
        assert_matches!(
            &items[1],
            Err(HarborError::Execution { exit_code: 2, stderr }) if stderr == "rate limited"
        );
    }

    #[tokio::test]
    async fn cancellation_terminates_process() {
        let provider = ScriptedSandboxProvider::new().with_turn(
            ScriptedTurn::messages([json!({"type": "system", "subtype": "init"})]).hanging(),
        );
        let t = transport(&provider);
        let _ = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        let cancel = CancellationToken::new();
        let mut stream = t.start_session(
            "x",
            SessionOptions {
                cancel: Some(cancel.clone()),
                ..SessionOptions::default()
            },
        );
        assert!(stream.next().await.unwrap().is_ok());
        cancel.cancel();
        assert_matches!(stream.next().await, Some(Err(HarborError::Abort)));
        assert!(stream.next().await.is_none());

        for _ in 0..50 {
            if !provider.signals().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(provider.signals(), vec![Signal::Terminate]);
    }

    #[tokio::test]
    async fn dropping_stream_terminates_process() {
        let provider = ScriptedSandboxProvider::new().with_turn(
            ScriptedTurn::messages([json!({"type": "system", "subtype": "init"})]).hanging(),
        );
        let t = transport(&provider);
        let _ = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        let mut stream = t.start_session("x", SessionOptions::default());
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        for _ in 0..50 {
            if !provider.signals().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(provider.signals(), vec![Signal::Terminate]);
    }

    #[tokio::test]
    async fn session_before_connect_fails_lazily() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        let stream = t.start_session("x", SessionOptions::default());
        assert!(provider.spawned().is_empty());
        let items = drain(stream).await;
        assert_matches!(&items[..], [Err(HarborError::Sandbox { .. })]);
    }

    #[tokio::test]
    async fn snapshot_stops_and_closes() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        let session_id = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        let record = t.create_snapshot().await.unwrap();
        assert_eq!(record.session_id, session_id);
        assert_eq!(record.expires_at - record.created_at, chrono::Duration::days(7));
        assert_eq!(provider.snapshots(), vec![record.id.clone()]);
        assert_eq!(t.state(), ConnectionState::Closed);
        assert!(t.create_snapshot().await.is_err());
    }

    #[tokio::test]
    async fn snapshot_requires_connection() {
        let t = transport(&ScriptedSandboxProvider::new());
        assert!(t.create_snapshot().await.is_err());
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let provider = ScriptedSandboxProvider::new();
        let t = transport(&provider);
        let _ = t.connect(creds(), ConnectOptions::default()).await.unwrap();
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert_eq!(provider.stop_count(), 1);
        assert_eq!(t.session_id(), None);
        assert!(t.connect(creds(), ConnectOptions::default()).await.is_err());
    }
}
