//! Snapshot policy and the snapshot ledger.
//!
//! Automatically created snapshots are never spliced into messages the
//! caller already received. They are recorded in a [`SnapshotLedger`] keyed
//! by session ID and passed to the `on_snapshot` callback.

use std::sync::Arc;

use dashmap::DashMap;
use harbor_core::{SessionId, SnapshotRecord};
use serde::{Deserialize, Serialize};

/// When to snapshot after a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotMode {
    /// Never.
    Never,
    /// Only after a successful run.
    #[default]
    OnSuccess,
    /// After every run that still holds a context.
    Always,
    /// Keep the context alive; the caller snapshots or closes it explicitly.
    OnDemand,
}

impl SnapshotMode {
    /// Parse `never`, `on-success`, `always`, `on-demand` (underscores
    /// accepted, case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "never" => Some(Self::Never),
            "on-success" => Some(Self::OnSuccess),
            "always" => Some(Self::Always),
            "on-demand" => Some(Self::OnDemand),
            _ => None,
        }
    }
}

/// Callback invoked with every snapshot a run creates.
pub type SnapshotCallback = Arc<dyn Fn(&SnapshotRecord) + Send + Sync>;

/// Advanced snapshot options.
#[derive(Clone, Default)]
pub struct SnapshotOptions {
    /// Policy.
    pub mode: SnapshotMode,
    /// Called after each snapshot is created.
    pub on_snapshot: Option<SnapshotCallback>,
}

impl std::fmt::Debug for SnapshotOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotOptions")
            .field("mode", &self.mode)
            .field("on_snapshot", &self.on_snapshot.is_some())
            .finish()
    }
}

impl SnapshotOptions {
    /// Options with the given mode and no callback.
    pub fn mode(mode: SnapshotMode) -> Self {
        Self {
            mode,
            on_snapshot: None,
        }
    }

    /// Set the callback.
    #[must_use]
    pub fn on_snapshot<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SnapshotRecord) + Send + Sync + 'static,
    {
        self.on_snapshot = Some(Arc::new(callback));
        self
    }
}

/// What teardown does with the context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TeardownAction {
    /// Snapshot (which also stops the context).
    Snapshot,
    /// Stop without a snapshot.
    Close,
    /// Leave the context for the caller.
    Keep,
}

/// Resolve the snapshot policy.
///
/// Advanced options win. Without them `auto_snapshot` means "snapshot iff
/// the run succeeded".
pub(crate) fn teardown_action(
    options: Option<&SnapshotOptions>,
    auto_snapshot: bool,
    success: bool,
) -> TeardownAction {
    let snapshot = match options.map(|o| o.mode) {
        Some(SnapshotMode::OnDemand) => return TeardownAction::Keep,
        Some(SnapshotMode::Never) => false,
        Some(SnapshotMode::Always) => true,
        Some(SnapshotMode::OnSuccess) => success,
        None => auto_snapshot && success,
    };
    if snapshot {
        TeardownAction::Snapshot
    } else {
        TeardownAction::Close
    }
}

/// Snapshots created by runs, keyed by session ID. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SnapshotLedger {
    records: Arc<DashMap<SessionId, SnapshotRecord>>,
}

impl SnapshotLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot under its session, replacing any earlier one.
    pub fn record(&self, record: SnapshotRecord) {
        let _ = self.records.insert(record.session_id.clone(), record);
    }

    /// Snapshot recorded for `session_id`.
    pub fn get(&self, session_id: &SessionId) -> Option<SnapshotRecord> {
        self.records.get(session_id).map(|entry| entry.value().clone())
    }

    /// Remove and return the snapshot for `session_id`.
    pub fn remove(&self, session_id: &SessionId) -> Option<SnapshotRecord> {
        self.records.remove(session_id).map(|(_, record)| record)
    }

    /// Number of recorded snapshots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
