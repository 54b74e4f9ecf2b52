//! Snapshot records.
//!
//! A snapshot is a persisted checkpoint of an execution context. Creating one
//! stops the context; the record is what callers keep to resume later.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, SnapshotId};

/// Days a snapshot stays resumable after creation.
pub const SNAPSHOT_TTL_DAYS: i64 = 7;

/// Metadata of a created snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    /// Snapshot ID, usable as a provisioning source.
    pub id: SnapshotId,
    /// Session that produced the snapshot.
    pub session_id: SessionId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry time, always `created_at + SNAPSHOT_TTL_DAYS`.
    pub expires_at: DateTime<Utc>,
    /// Size in bytes, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Snapshot this context was itself restored from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<SnapshotId>,
}

impl SnapshotRecord {
    /// Build a record, deriving the expiry from `created_at`.
    #[must_use]
    pub fn new(
        id: SnapshotId,
        session_id: SessionId,
        created_at: DateTime<Utc>,
        size_bytes: Option<u64>,
        parent_snapshot_id: Option<SnapshotId>,
    ) -> Self {
        Self {
            id,
            session_id,
            created_at,
            expires_at: created_at + Duration::days(SNAPSHOT_TTL_DAYS),
            size_bytes,
            parent_snapshot_id,
        }
    }

    /// Whether the snapshot has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
