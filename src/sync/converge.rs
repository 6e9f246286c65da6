//! Bounded apply-and-reread loop.
//!
//! Each round reads the full live set again because the device may expose
//! new parameters after others change (enabling a driver adds its settings).

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::diff::{Diff, DiffEntry, ValueComparison, compute_diff};
use crate::device::{ParameterStore, WriteAck};
use crate::params::ParameterSpec;

pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceOptions {
    pub max_rounds: u32,
    /// Pause after each write round before re-reading.
    pub settle_delay: Duration,
    pub comparison: ValueComparison,
}

impl Default for ConvergenceOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            settle_delay: DEFAULT_SETTLE_DELAY,
            comparison: ValueComparison::Exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    NotReached,
    Aborted { reason: String },
}

/// Why a single write did not take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The device answered with a nack.
    Rejected,
    /// No answer after store-level retries.
    Transport,
    /// Unknown name or wrong type.
    Integrity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub name: String,
    pub round: u32,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceResult {
    #[serde(flatten)]
    pub status: ConvergenceStatus,
    /// Writes the device accepted, across all rounds.
    pub applied_count: usize,
    /// Write calls issued, accepted or not.
    pub writes_attempted: usize,
    pub final_diff: Diff,
    pub rounds_used: u32,
    pub failures: Vec<ApplyFailure>,
}

impl ConvergenceResult {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

pub struct ConvergenceLoop {
    options: ConvergenceOptions,
}

impl ConvergenceLoop {
    #[must_use]
    pub const fn new(options: ConvergenceOptions) -> Self {
        Self { options }
    }

    /// Apply `spec` until the device matches it or the round budget runs out.
    #[instrument(skip_all, fields(version = %spec.version(), params = spec.len()))]
    pub fn converge<S>(&self, spec: &ParameterSpec, store: &mut S) -> ConvergenceResult
    where
        S: ParameterStore + ?Sized,
    {
        let mut run = Run::default();
        let mut rejected: HashSet<String> = HashSet::new();
        let mut integrity_abort: Option<String> = None;

        loop {
            let live = match store.read_all() {
                Ok(live) => live,
                Err(e) => {
                    warn!(round = run.rounds, error = %e, "Reading live parameters failed");
                    return run.finish(
                        ConvergenceStatus::Aborted {
                            reason: format!("reading live parameters failed: {e}"),
                        },
                        Diff::default(),
                    );
                }
            };

            let diff = match compute_diff(spec, &live, self.options.comparison) {
                Ok(diff) => diff,
                Err(e) => {
                    warn!(error = %e, "Spec does not match the device parameter directory");
                    return run.finish(
                        ConvergenceStatus::Aborted {
                            reason: e.to_string(),
                        },
                        Diff::default(),
                    );
                }
            };

            if let Some(reason) = integrity_abort {
                return run.finish(ConvergenceStatus::Aborted { reason }, diff);
            }

            if !diff.has_mismatches() {
                for entry in diff.absent() {
                    warn!(name = entry.name(), "Parameter not present on device, skipped");
                }
                info!(rounds = run.rounds, applied = run.applied, "Parameters converged");
                return run.finish(ConvergenceStatus::Converged, diff);
            }

            if run.rounds >= self.options.max_rounds {
                warn!(
                    rounds = run.rounds,
                    remaining = diff.mismatch_count(),
                    "Convergence bound reached with mismatches remaining"
                );
                return run.finish(ConvergenceStatus::NotReached, diff);
            }

            let pending: Vec<&DiffEntry> = diff
                .mismatches()
                .filter(|e| !rejected.contains(e.name()))
                .collect();
            if pending.is_empty() {
                warn!(
                    remaining = diff.mismatch_count(),
                    "Every remaining mismatch was rejected by the device"
                );
                return run.finish(ConvergenceStatus::NotReached, diff);
            }

            run.rounds += 1;
            info!(round = run.rounds, changes = pending.len(), "Applying parameter changes");

            for entry in pending {
                let DiffEntry::Mismatch { name, old, new } = entry else {
                    continue;
                };
                debug!(round = run.rounds, %name, %old, %new, "Writing parameter");
                run.writes += 1;

                match store.write(name, *new) {
                    Ok(WriteAck::Accepted) => run.applied += 1,
                    Ok(WriteAck::Rejected { reason }) => {
                        warn!(%name, %reason, "Write rejected");
                        rejected.insert(name.clone());
                        run.fail(name, FailureKind::Rejected, reason);
                    }
                    Err(e) if e.is_integrity_error() => {
                        warn!(%name, error = %e, "Write failed, aborting after this round");
                        integrity_abort.get_or_insert_with(|| e.to_string());
                        run.fail(name, FailureKind::Integrity, e.to_string());
                    }
                    Err(e) => {
                        warn!(%name, error = %e, "Write failed");
                        run.fail(name, FailureKind::Transport, e.to_string());
                    }
                }
            }

            if !self.options.settle_delay.is_zero() {
                debug!(
                    delay_ms = self.options.settle_delay.as_millis(),
                    "Waiting before re-reading"
                );
                std::thread::sleep(self.options.settle_delay);
            }
        }
    }
}

#[derive(Default)]
struct Run {
    rounds: u32,
    applied: usize,
    writes: usize,
    failures: Vec<ApplyFailure>,
}

impl Run {
    fn fail(&mut self, name: &str, kind: FailureKind, reason: String) {
        self.failures.push(ApplyFailure {
            name: name.to_string(),
            round: self.rounds,
            kind,
            reason,
        });
    }

    fn finish(self, status: ConvergenceStatus, final_diff: Diff) -> ConvergenceResult {
        ConvergenceResult {
            status,
            applied_count: self.applied,
            writes_attempted: self.writes,
            final_diff,
            rounds_used: self.rounds,
            failures: self.failures,
        }
    }
}
