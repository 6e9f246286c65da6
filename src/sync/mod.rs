//! Synchronization engine.
//!
//! Leaves first: [`version`] gates a session on the last applied spec
//! version, [`diff`] compares desired and live values, [`converge`] applies
//! diffs until a fixpoint or a bound, [`readiness`] checks the vehicle can
//! still fly, [`revert`] restores the pre-sync snapshot, and [`session`]
//! runs them for every component of a file and settles on one terminal
//! outcome.

pub mod converge;
pub mod diff;
pub mod readiness;
pub mod revert;
pub mod session;
pub mod version;

pub use converge::{
    ApplyFailure, ConvergenceLoop, ConvergenceOptions, ConvergenceResult, ConvergenceStatus,
    FailureKind,
};
pub use diff::{Diff, DiffEntry, ValueComparison, compute_diff};
pub use readiness::{FlightReadinessGuard, Readiness, ReadinessSource};
pub use revert::{RevertFailure, RevertManager, RevertResult, Snapshot};
pub use session::{
    ComponentReport, FailureReason, SessionOutcome, SessionReport, SnapshotArchive, SyncOptions,
    SyncSession,
};
pub use version::{
    GateDecision, LastApplied, MemoryVersionStore, VersionRecord, VersionStore, evaluate_gate,
    should_proceed,
};
