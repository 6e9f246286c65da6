//! Pre-sync snapshot and best-effort restore.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::device::{ParameterStore, WriteAck};
use crate::error::{Result, SyncError};
use crate::params::{LiveParams, Parameter};

/// Live parameter values captured once, before any write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    captured_at: DateTime<Utc>,
    params: LiveParams,
}

impl Snapshot {
    /// Read the full live set from the device.
    pub fn capture<S>(store: &mut S) -> Result<Self>
    where
        S: ParameterStore + ?Sized,
    {
        let params = store.read_all()?;
        debug!(params = params.len(), "Snapshot captured");
        Ok(Self::from_params(params, Utc::now()))
    }

    #[must_use]
    pub const fn from_params(params: LiveParams, captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            params,
        }
    }

    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    #[must_use]
    pub const fn params(&self) -> &LiveParams {
        &self.params
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevertResult {
    pub restored_count: usize,
    /// Entries already at their snapshot value.
    pub unchanged_count: usize,
    pub failures: Vec<RevertFailure>,
}

impl RevertResult {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, name: &str, reason: impl Into<String>) {
        self.failures.push(RevertFailure {
            name: name.to_string(),
            reason: reason.into(),
        });
    }
}

enum Lookup {
    Found(Parameter),
    Absent,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RevertManager;

impl RevertManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Write back every snapshot value that differs from the live one.
    ///
    /// Individual failures are collected, never short-circuited. Parameters
    /// that are not part of the snapshot are left alone.
    #[instrument(skip_all, fields(params = snapshot.len()))]
    pub fn revert<S>(&self, snapshot: &Snapshot, store: &mut S) -> RevertResult
    where
        S: ParameterStore + ?Sized,
    {
        let mut result = RevertResult::default();
        let mut absent: Vec<&Parameter> = Vec::new();

        let live = read_live(store);
        for original in snapshot.params().values() {
            match lookup(live.as_ref(), store, &original.name) {
                Lookup::Found(current) => restore_one(store, original, &current, &mut result),
                Lookup::Absent => absent.push(original),
                Lookup::Failed(reason) => result.fail(&original.name, reason),
            }
        }

        if !absent.is_empty() {
            // Reverting a trigger parameter may bring these back.
            debug!(count = absent.len(), "Retrying parameters absent from device");
            let live = read_live(store);
            for original in absent {
                match lookup(live.as_ref(), store, &original.name) {
                    Lookup::Found(current) => {
                        restore_one(store, original, &current, &mut result);
                    }
                    Lookup::Absent => {
                        result.fail(&original.name, "parameter no longer present on device");
                    }
                    Lookup::Failed(reason) => result.fail(&original.name, reason),
                }
            }
        }

        if result.is_complete() {
            info!(
                restored = result.restored_count,
                unchanged = result.unchanged_count,
                "Revert complete"
            );
        } else {
            let names: Vec<&str> = result.failures.iter().map(|f| f.name.as_str()).collect();
            error!(
                restored = result.restored_count,
                failed = result.failures.len(),
                params = ?names,
                "REVERT INCOMPLETE: vehicle parameters are in a mixed state"
            );
        }
        result
    }
}

fn read_live<S: ParameterStore + ?Sized>(store: &mut S) -> Option<LiveParams> {
    match store.read_all() {
        Ok(live) => Some(live),
        Err(e) => {
            warn!(error = %e, "Full read failed, reading parameters one by one");
            None
        }
    }
}

fn lookup<S: ParameterStore + ?Sized>(
    live: Option<&LiveParams>,
    store: &mut S,
    name: &str,
) -> Lookup {
    match live {
        Some(live) => live.get(name).cloned().map_or(Lookup::Absent, Lookup::Found),
        None => match store.read_one(name) {
            Ok(param) => Lookup::Found(param),
            Err(SyncError::UnknownParameter { .. }) => Lookup::Absent,
            Err(e) => Lookup::Failed(e.to_string()),
        },
    }
}

fn restore_one<S: ParameterStore + ?Sized>(
    store: &mut S,
    original: &Parameter,
    current: &Parameter,
    result: &mut RevertResult,
) {
    if current.value == original.value {
        result.unchanged_count += 1;
        return;
    }

    debug!(name = %original.name, from = %current.value, to = %original.value, "Restoring parameter");
    match store.write(&original.name, original.value) {
        Ok(WriteAck::Accepted) => result.restored_count += 1,
        Ok(WriteAck::Rejected { reason }) => {
            warn!(name = %original.name, %reason, "Restore rejected");
            result.fail(&original.name, format!("rejected: {reason}"));
        }
        Err(e) => {
            warn!(name = %original.name, error = %e, "Restore failed");
            result.fail(&original.name, e.to_string());
        }
    }
}
