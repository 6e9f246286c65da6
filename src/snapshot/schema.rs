//! Archived snapshot types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::params::{Parameter, SpecVersion, live_params};
use crate::sync::revert::Snapshot;

/// A pre-sync snapshot as stored in the archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedSnapshot {
    pub id: i64,
    /// Session that captured the snapshot.
    pub session_id: String,
    /// Spec version the session was about to apply.
    pub spec_version: SpecVersion,
    pub device: String,
    pub captured_at: DateTime<Utc>,
    pub params: Vec<Parameter>,
}

impl ArchivedSnapshot {
    /// Rebuild the immutable snapshot used by the revert manager.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::from_params(live_params(self.params.iter().cloned()), self.captured_at)
    }
}

/// Summary row for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub id: i64,
    pub session_id: String,
    pub spec_version: SpecVersion,
    pub device: String,
    pub captured_at: DateTime<Utc>,
    pub param_count: usize,
}
