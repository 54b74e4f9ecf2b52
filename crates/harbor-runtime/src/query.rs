//! Public entry point: [`query`] and the [`QueryHandle`] it returns.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use harbor_core::{HarborError, Message, SessionId, SnapshotRecord};
use harbor_transport::Transport;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::options::QueryOptions;
use crate::run::Run;
use crate::snapshot::{SnapshotCallback, SnapshotLedger};
use crate::state::QueryState;

/// Messages buffered between the run task and the caller.
const CHANNEL_CAPACITY: usize = 64;

/// State shared between a handle and its run task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<QueryState>,
    pub(crate) cancel: CancellationToken,
    pub(crate) session_id: Mutex<Option<SessionId>>,
    /// Transport kept alive for an on-demand snapshot.
    pub(crate) kept: Mutex<Option<Arc<Transport>>>,
    ledger: SnapshotLedger,
    on_snapshot: Option<SnapshotCallback>,
}

impl Shared {
    pub(crate) fn record_snapshot(&self, record: SnapshotRecord) {
        info!(snapshot_id = %record.id, session_id = %record.session_id, "snapshot recorded");
        self.ledger.record(record.clone());
        if let Some(callback) = &self.on_snapshot {
            callback(&record);
        }
    }
}

/// A running (or not yet started) query.
///
/// The handle is a [`Stream`] of messages. Nothing happens until it is first
/// polled: the sandbox is provisioned then, and the run proceeds on its own
/// task while the caller consumes. A run failure arrives as the last item.
/// Interrupting ends the stream without an error item.
///
/// Dropping the handle interrupts the run; teardown still happens.
pub struct QueryHandle {
    shared: Arc<Shared>,
    pending: Option<Run>,
    rx: mpsc::Receiver<Result<Message, HarborError>>,
}

/// Start a query against a sandboxed CLI.
///
/// ```ignore
/// let mut run = query("Summarize the repo", QueryOptions::new(provider));
/// while let Some(message) = run.next().await {
///     println!("{:?}", message?);
/// }
/// ```
pub fn query(prompt: impl Into<String>, options: QueryOptions) -> QueryHandle {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let shared = Arc::new(Shared {
        state: Mutex::new(QueryState::NotStarted),
        cancel: CancellationToken::new(),
        session_id: Mutex::new(None),
        kept: Mutex::new(None),
        ledger: options.ledger.clone(),
        on_snapshot: options.snapshot.as_ref().and_then(|s| s.on_snapshot.clone()),
    });
    let run = Run::new(prompt.into(), options, Arc::clone(&shared), tx);
    QueryHandle {
        shared,
        pending: Some(run),
        rx,
    }
}

impl QueryHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> QueryState {
        *self.shared.state.lock()
    }

    /// Session ID, once the sandbox is connected.
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.session_id.lock().clone()
    }

    /// Stop the run. The CLI process is terminated, teardown runs, and the
    /// stream ends. No effect once the run has finished.
    pub fn interrupt(&self) {
        let state = self.shared.state.lock().advance(QueryState::Interrupted);
        if state == QueryState::Interrupted {
            debug!("query interrupted");
            self.shared.cancel.cancel();
        }
    }

    /// The snapshot taken for this run, if any.
    pub fn snapshot(&self) -> Option<SnapshotRecord> {
        let session_id = self.session_id()?;
        self.shared.ledger.get(&session_id)
    }

    /// The ledger this run records snapshots into.
    pub fn ledger(&self) -> &SnapshotLedger {
        &self.shared.ledger
    }

    /// Snapshot a sandbox kept by [`SnapshotMode::OnDemand`](crate::SnapshotMode::OnDemand).
    ///
    /// Only valid after the stream has ended. Consumes the kept sandbox.
    pub async fn create_snapshot(&self) -> Result<SnapshotRecord, HarborError> {
        let transport = self.shared.kept.lock().take().ok_or_else(|| {
            HarborError::sandbox("no sandbox kept for snapshotting; use on-demand snapshots and finish the run first")
        })?;
        let record = transport.create_snapshot().await?;
        self.shared.record_snapshot(record.clone());
        Ok(record)
    }

    /// Release a sandbox kept by on-demand snapshotting without snapshotting it.
    pub async fn close(&self) -> Result<(), HarborError> {
        let kept = self.shared.kept.lock().take();
        match kept {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }
}

impl Stream for QueryHandle {
    type Item = Result<Message, HarborError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(run) = self.pending.take() {
            let start = {
                let mut state = self.shared.state.lock();
                if *state == QueryState::NotStarted {
                    *state = QueryState::Running;
                    true
                } else {
                    false
                }
            };
            if start {
                let _ = tokio::spawn(run.execute());
            }
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        if !self.shared.state.lock().is_terminal() {
            self.interrupt();
        }
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}
