//! One synchronization session from gate to terminal outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::converge::{ConvergenceLoop, ConvergenceOptions, ConvergenceResult, ConvergenceStatus};
use super::readiness::{FlightReadinessGuard, Readiness, ReadinessSource};
use super::revert::{RevertManager, RevertResult, Snapshot};
use super::version::{GateDecision, VersionRecord, VersionStore, evaluate_gate};
use crate::device::ParameterStore;
use crate::error::Result;
use crate::params::{Component, ParamFile, ParameterSpec, SpecVersion};

/// Long-term storage for pre-sync snapshots.
pub trait SnapshotArchive {
    /// Store a snapshot and return its archive id.
    fn archive(
        &mut self,
        session_id: &str,
        spec_version: &SpecVersion,
        device: &str,
        snapshot: &Snapshot,
    ) -> Result<i64>;
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub skip_version_check: bool,
    pub convergence: ConvergenceOptions,
    pub readiness: ReadinessSource,
    /// Only some components of the file are applied; the version is not
    /// recorded.
    pub partial: bool,
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    InAir,
    FlightStateUnknown { error: String },
    SnapshotFailed { error: String },
    ConvergenceNotReached { remaining: usize },
    Aborted { reason: String },
    NotReady { reason: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InAir => f.write_str("vehicle is in the air"),
            Self::FlightStateUnknown { error } => write!(f, "flight state unknown: {error}"),
            Self::SnapshotFailed { error } => write!(f, "could not capture snapshot: {error}"),
            Self::ConvergenceNotReached { remaining } => {
                write!(f, "convergence not reached, {remaining} parameter(s) still differ")
            }
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
            Self::NotReady { reason } => write!(f, "not ready to fly: {reason}"),
        }
    }
}

/// Terminal state of a session or of one component in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Skipped,
    FailedNoRevertNeeded { reason: FailureReason },
    FailedReverted { reason: FailureReason },
    FailedRevertIncomplete { reason: FailureReason },
}

impl SessionOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Success | Self::Skipped => 0,
            Self::FailedNoRevertNeeded { .. } => 2,
            Self::FailedReverted { .. } => 3,
            Self::FailedRevertIncomplete { .. } => 4,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.exit_code() != 0
    }

    #[must_use]
    pub const fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Success | Self::Skipped => None,
            Self::FailedNoRevertNeeded { reason }
            | Self::FailedReverted { reason }
            | Self::FailedRevertIncomplete { reason } => Some(reason),
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::FailedNoRevertNeeded { .. } => "failed-no-revert-needed",
            Self::FailedReverted { .. } => "failed-reverted",
            Self::FailedRevertIncomplete { .. } => "failed-revert-incomplete",
        }
    }
}

/// What happened to one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
    #[serde(flatten)]
    pub outcome: SessionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Readiness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert: Option<RevertResult>,
}

impl ComponentReport {
    const fn new(component: Option<Component>) -> Self {
        Self {
            component,
            outcome: SessionOutcome::Success,
            snapshot_id: None,
            convergence: None,
            readiness: None,
            revert: None,
        }
    }
}

/// Everything that happened in a session.
///
/// `outcome` is the outcome of the session as a whole: the outcome of the
/// first failed component, or success once every component was applied.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub device: String,
    pub spec_version: SpecVersion,
    pub gate: GateDecision,
    #[serde(flatten)]
    pub outcome: SessionOutcome,
    /// Components in the order they were applied. Empty when skipped.
    pub components: Vec<ComponentReport>,
    pub version_saved: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// Drives gate, snapshot, convergence, readiness and revert.
///
/// The version gate and the version record cover the whole session; every
/// other step runs per component.
pub struct SyncSession<'a> {
    options: SyncOptions,
    versions: &'a mut dyn VersionStore,
    archive: Option<&'a mut dyn SnapshotArchive>,
}

impl<'a> SyncSession<'a> {
    pub fn new(options: SyncOptions, versions: &'a mut dyn VersionStore) -> Self {
        Self {
            options,
            versions,
            archive: None,
        }
    }

    #[must_use]
    pub fn with_archive(mut self, archive: &'a mut dyn SnapshotArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Apply a single desired set. Never fails: every path ends in a
    /// [`SessionOutcome`].
    pub fn run<S>(&mut self, spec: &ParameterSpec, store: &mut S) -> SessionReport
    where
        S: ParameterStore + ?Sized,
    {
        self.run_targets(spec.version(), &[(None, spec)], spec.digest(), store)
    }

    /// Apply every component of a parameter file, in file order.
    ///
    /// The first failed component ends the session; later components are
    /// left untouched. The version is recorded only after all of them
    /// succeeded.
    pub fn run_file<S>(&mut self, file: &ParamFile, store: &mut S) -> SessionReport
    where
        S: ParameterStore + ?Sized,
    {
        let targets: Vec<(Option<Component>, &ParameterSpec)> =
            file.components().map(|(c, spec)| (Some(*c), spec)).collect();
        self.run_targets(&file.version, &targets, file.digest(), store)
    }

    fn run_targets<S>(
        &mut self,
        version: &SpecVersion,
        targets: &[(Option<Component>, &ParameterSpec)],
        digest: String,
        store: &mut S,
    ) -> SessionReport
    where
        S: ParameterStore + ?Sized,
    {
        let session_id = Uuid::new_v4().to_string();
        let span = info_span!("sync_session", session_id = %session_id, version = %version);
        let _guard = span.enter();

        let mut report = SessionReport {
            session_id,
            device: store.describe(),
            spec_version: version.clone(),
            gate: GateDecision::Skip,
            outcome: SessionOutcome::Skipped,
            components: Vec::with_capacity(targets.len()),
            version_saved: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        report.gate = evaluate_gate(version, &*self.versions, self.options.skip_version_check);
        if !report.gate.proceeds() {
            info!(%version, "Version didn't change, nothing to do");
            return finish(report);
        }

        report.outcome = SessionOutcome::Success;
        for (applied, (component, spec)) in targets.iter().enumerate() {
            let result = self.apply_component(&report, *component, spec, store);
            let failed = result.outcome.is_failure();
            if failed {
                report.outcome = result.outcome.clone();
            }
            report.components.push(result);
            if failed {
                let untouched = targets.len() - applied - 1;
                if untouched > 0 {
                    warn!(untouched, "Stopping after failed component");
                }
                break;
            }
        }

        if !report.outcome.is_failure() {
            report.version_saved = self.persist_version(version, digest);
            info!(%version, components = targets.len(), "Parameters updated");
        }
        finish(report)
    }

    fn apply_component<S>(
        &mut self,
        session: &SessionReport,
        component: Option<Component>,
        spec: &ParameterSpec,
        store: &mut S,
    ) -> ComponentReport
    where
        S: ParameterStore + ?Sized,
    {
        let mut report = ComponentReport::new(component);
        let label = component.map(|c| format!(" {c}")).unwrap_or_default();

        match store.in_air() {
            Ok(false) => {}
            Ok(true) => {
                warn!("Vehicle in air, refusing to touch parameters");
                report.outcome = SessionOutcome::FailedNoRevertNeeded {
                    reason: FailureReason::InAir,
                };
                return report;
            }
            Err(e) => {
                report.outcome = SessionOutcome::FailedNoRevertNeeded {
                    reason: FailureReason::FlightStateUnknown {
                        error: e.to_string(),
                    },
                };
                return report;
            }
        }

        notify(store, &format!("Updating params. Do not take off.{label}"));
        info!(device = %session.device, component = label.trim(), "Updating parameters");

        let snapshot = match Snapshot::capture(store) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Snapshot capture failed, no parameters written");
                report.outcome = SessionOutcome::FailedNoRevertNeeded {
                    reason: FailureReason::SnapshotFailed {
                        error: e.to_string(),
                    },
                };
                notify(store, &format!("Parameter update failed.{label}"));
                return report;
            }
        };
        report.snapshot_id = self.archive_snapshot(session, &snapshot);

        let convergence = ConvergenceLoop::new(self.options.convergence.clone()).converge(spec, store);

        let failure = match &convergence.status {
            ConvergenceStatus::Aborted { reason } => Some(FailureReason::Aborted {
                reason: reason.clone(),
            }),
            status => {
                let readiness = FlightReadinessGuard::new(self.options.readiness.clone())
                    .check_ready(store);
                let failure = if *status == ConvergenceStatus::NotReached {
                    Some(FailureReason::ConvergenceNotReached {
                        remaining: convergence.final_diff.mismatch_count(),
                    })
                } else if let Readiness::NotReady { reason } = &readiness {
                    Some(FailureReason::NotReady {
                        reason: reason.clone(),
                    })
                } else {
                    None
                };
                report.readiness = Some(readiness);
                failure
            }
        };
        let writes_attempted = convergence.writes_attempted;
        report.convergence = Some(convergence);

        report.outcome = match failure {
            None => SessionOutcome::Success,
            Some(reason) if writes_attempted == 0 => {
                warn!(%reason, "Session failed before any write");
                SessionOutcome::FailedNoRevertNeeded { reason }
            }
            Some(reason) => {
                warn!(%reason, "Reverting to pre-sync parameters");
                let message = if matches!(reason, FailureReason::NotReady { .. }) {
                    "Not armable, reverting. Do not take off."
                } else {
                    "Parameter update failed, reverting. Do not take off."
                };
                notify(store, message);

                let revert = RevertManager::new().revert(&snapshot, store);
                let outcome = if revert.is_complete() {
                    SessionOutcome::FailedReverted { reason }
                } else {
                    notify(store, "Revert incomplete. Do not take off.");
                    SessionOutcome::FailedRevertIncomplete { reason }
                };
                report.revert = Some(revert);
                outcome
            }
        };

        notify(store, &format!("Finished updating params.{label}"));
        report
    }

    fn archive_snapshot(&mut self, session: &SessionReport, snapshot: &Snapshot) -> Option<i64> {
        let archive = self.archive.as_mut()?;
        match archive.archive(
            &session.session_id,
            &session.spec_version,
            &session.device,
            snapshot,
        ) {
            Ok(id) => {
                info!(snapshot_id = id, params = snapshot.len(), "Snapshot archived");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "Snapshot archive failed, continuing with in-memory snapshot");
                None
            }
        }
    }

    fn persist_version(&mut self, version: &SpecVersion, digest: String) -> bool {
        if self.options.skip_version_check {
            info!("Version check skipped, last applied version left unchanged");
            return false;
        }
        if self.options.partial {
            info!("Only part of the file was applied, last applied version left unchanged");
            return false;
        }
        if version.is_empty() {
            debug!("Parameter file has no version, nothing to record");
            return false;
        }
        let record = VersionRecord::applied_now(version.clone(), digest);
        match self.versions.save(&record) {
            Ok(()) => true,
            Err(e) => {
                // The device is in sync; the next run re-applies idempotently.
                warn!(error = %e, "Could not persist applied version");
                false
            }
        }
    }
}

fn notify<S: ParameterStore + ?Sized>(store: &mut S, message: &str) {
    if let Err(e) = store.notify(message) {
        warn!(error = %e, message, "Status message not delivered");
    }
}

fn finish(mut report: SessionReport) -> SessionReport {
    report.finished_at = Utc::now();
    info!(outcome = report.outcome.label(), "Session finished");
    report
}
