//! SQLite database operations for snapshot storage.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument, trace};

use super::schema::{ArchivedSnapshot, SnapshotSummary};
use crate::error::{Result, SyncError};
use crate::params::{ParamType, ParamValue, Parameter, SpecVersion};
use crate::sync::revert::Snapshot;
use crate::sync::session::SnapshotArchive;

/// SQLite schema for snapshot storage.
const SCHEMA_SQL: &str = r"
-- One row per captured snapshot
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    spec_version TEXT NOT NULL,
    device TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Parameter values within a snapshot
CREATE TABLE IF NOT EXISTS snapshot_params (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    type_tag INTEGER NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(snapshot_id, name)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_params_snapshot ON snapshot_params(snapshot_id);
CREATE INDEX IF NOT EXISTS idx_snapshots_captured ON snapshots(captured_at);
";

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> SyncError + '_ {
    move |e| SyncError::Snapshot(format!("{context}: {e}"))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Snapshot(format!("Invalid timestamp '{text}': {e}")))
}

/// Database wrapper for snapshot storage.
pub struct SnapshotDb {
    conn: Connection,
}

impl SnapshotDb {
    /// Opens or creates a database at the standard location.
    #[instrument]
    pub fn open_default() -> Result<Self> {
        let path = default_db_path()?;
        Self::open(&path)
    }

    /// Opens or creates a database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Snapshot(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        debug!(path = %path.display(), "Opening snapshot database");
        let conn = Connection::open(path).map_err(db_err("Failed to open database"))?;

        let db = Self { conn };
        db.init_schema()?;
        debug!(path = %path.display(), "Snapshot database ready");
        Ok(db)
    }

    /// Creates an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(db_err("Failed to create in-memory database"))?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute("PRAGMA foreign_keys = ON", [])
            .map_err(db_err("Failed to enable foreign keys"))?;
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(db_err("Failed to initialize schema"))?;
        Ok(())
    }

    /// Saves a snapshot and returns its id.
    #[instrument(skip(self, spec_version, snapshot), fields(params = snapshot.len()))]
    pub fn save_snapshot(
        &mut self,
        session_id: &str,
        spec_version: &SpecVersion,
        device: &str,
        snapshot: &Snapshot,
    ) -> Result<i64> {
        let tx = self
            .conn
            .transaction()
            .map_err(db_err("Failed to start transaction"))?;

        tx.execute(
            "INSERT INTO snapshots (session_id, spec_version, device, captured_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                spec_version.as_str(),
                device,
                snapshot.captured_at().to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err("Failed to insert snapshot"))?;
        let snapshot_id = tx.last_insert_rowid();

        for param in snapshot.params().values() {
            trace!(name = %param.name, "Inserting snapshot parameter");
            tx.execute(
                "INSERT INTO snapshot_params (snapshot_id, name, type_tag, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot_id,
                    param.name,
                    param.param_type().tag(),
                    param.value.to_string(),
                ],
            )
            .map_err(db_err("Failed to insert snapshot parameter"))?;
        }

        tx.commit().map_err(db_err("Failed to commit transaction"))?;

        info!(id = snapshot_id, params = snapshot.len(), "Snapshot saved");
        Ok(snapshot_id)
    }

    /// Loads a snapshot by id.
    #[instrument(skip(self))]
    pub fn load_snapshot(&self, id: i64) -> Result<Option<ArchivedSnapshot>> {
        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT session_id, spec_version, device, captured_at FROM snapshots WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();

        let Some((session_id, spec_version, device, captured_at)) = row else {
            debug!(id, "Snapshot not found");
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, type_tag, value FROM snapshot_params
                 WHERE snapshot_id = ?1 ORDER BY name",
            )
            .map_err(db_err("Failed to prepare statement"))?;

        let rows: Vec<(String, u8, String)> = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(db_err("Failed to query parameters"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to collect parameters"))?;

        let params = rows
            .into_iter()
            .map(|(name, tag, value)| {
                let param_type = ParamType::from_tag(tag).ok_or_else(|| {
                    SyncError::Snapshot(format!("Unknown type tag {tag} for {name}"))
                })?;
                Ok(Parameter::new(name, ParamValue::parse(&value, param_type)?))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(id, params = params.len(), "Snapshot loaded");
        Ok(Some(ArchivedSnapshot {
            id,
            session_id,
            spec_version: SpecVersion::new(spec_version),
            device,
            captured_at: parse_time(&captured_at)?,
            params,
        }))
    }

    /// Lists snapshots, newest first.
    #[instrument(skip(self))]
    pub fn list_snapshots(&self, limit: Option<usize>) -> Result<Vec<SnapshotSummary>> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self
            .conn
            .prepare(
                "SELECT s.id, s.session_id, s.spec_version, s.device, s.captured_at,
                        (SELECT COUNT(*) FROM snapshot_params p WHERE p.snapshot_id = s.id)
                 FROM snapshots s ORDER BY s.id DESC LIMIT ?1",
            )
            .map_err(db_err("Failed to prepare statement"))?;

        let rows: Vec<(i64, String, String, String, String, usize)> = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(db_err("Failed to query snapshots"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Failed to collect snapshots"))?;

        let summaries = rows
            .into_iter()
            .map(|(id, session_id, spec_version, device, captured_at, param_count)| {
                Ok(SnapshotSummary {
                    id,
                    session_id,
                    spec_version: SpecVersion::new(spec_version),
                    device,
                    captured_at: parse_time(&captured_at)?,
                    param_count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = summaries.len(), "Listed snapshots");
        Ok(summaries)
    }

    /// Deletes all but the newest `keep` snapshots. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn prune(&mut self, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let deleted = self
            .conn
            .execute(
                "DELETE FROM snapshots WHERE id NOT IN
                 (SELECT id FROM snapshots ORDER BY id DESC LIMIT ?1)",
                params![keep],
            )
            .map_err(db_err("Failed to prune snapshots"))?;

        if deleted > 0 {
            info!(deleted, "Old snapshots pruned");
        }
        Ok(deleted)
    }
}

impl SnapshotArchive for SnapshotDb {
    fn archive(
        &mut self,
        session_id: &str,
        spec_version: &SpecVersion,
        device: &str,
        snapshot: &Snapshot,
    ) -> Result<i64> {
        self.save_snapshot(session_id, spec_version, device, snapshot)
    }
}

/// Returns the default database path.
///
/// Location: `~/.local/share/psync/snapshots.db`
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| {
        SyncError::Other("Could not determine local data directory".to_string())
    })?;
    Ok(data_dir.join("psync").join("snapshots.db"))
}
