//! Archive of pre-sync parameter snapshots.
//!
//! Every session that gets past the version gate stores the snapshot it
//! captured, so a vehicle can be restored by hand long after the session
//! that changed it has exited.
//!
//! # Usage
//!
//! ```ignore
//! use psync::snapshot::SnapshotDb;
//!
//! let db = SnapshotDb::open_default()?;
//! for summary in db.list_snapshots(Some(10))? {
//!     println!("{}: {} ({} params)", summary.id, summary.spec_version, summary.param_count);
//! }
//! ```

mod db;
mod schema;

pub use db::{SnapshotDb, default_db_path};
pub use schema::{ArchivedSnapshot, SnapshotSummary};
