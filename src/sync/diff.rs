//! Desired-versus-live comparison.

use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::params::{LiveParams, ParamValue, ParameterSpec};

/// How desired and live values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ValueComparison {
    /// Native equality of the declared type.
    #[default]
    Exact,
    /// Reals equal within a relative tolerance; integers still exact.
    Relative(f64),
}

impl ValueComparison {
    #[must_use]
    pub fn equal(self, a: &ParamValue, b: &ParamValue) -> bool {
        match self {
            Self::Exact => a == b,
            Self::Relative(tolerance) => a.approx_eq(b, tolerance),
        }
    }
}

/// One parameter that needs attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    /// Present on the device with a different value.
    Mismatch {
        name: String,
        old: ParamValue,
        new: ParamValue,
    },
    /// Desired but unknown to the device.
    Absent { name: String, desired: ParamValue },
}

impl DiffEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Mismatch { name, .. } | Self::Absent { name, .. } => name,
        }
    }

    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}

/// Ordered diff in spec order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diff {
    entries: Vec<DiffEntry>,
}

impl Diff {
    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.is_mismatch())
    }

    pub fn absent(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| !e.is_mismatch())
    }

    #[must_use]
    pub fn mismatch_count(&self) -> usize {
        self.mismatches().count()
    }

    #[must_use]
    pub fn absent_count(&self) -> usize {
        self.absent().count()
    }

    /// True if some parameter can and should be written.
    #[must_use]
    pub fn has_mismatches(&self) -> bool {
        self.entries.iter().any(DiffEntry::is_mismatch)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compute the parameters whose desired value differs from the live one.
///
/// A type tag disagreement between spec and device is a data-integrity error
/// and is returned as `SyncError::TypeMismatch` rather than coerced.
pub fn compute_diff(
    spec: &ParameterSpec,
    live: &LiveParams,
    comparison: ValueComparison,
) -> Result<Diff> {
    let mut entries = Vec::new();

    for desired in spec.iter() {
        let Some(current) = live.get(&desired.name) else {
            entries.push(DiffEntry::Absent {
                name: desired.name.clone(),
                desired: desired.value,
            });
            continue;
        };

        if current.param_type() != desired.param_type() {
            return Err(SyncError::TypeMismatch {
                name: desired.name.clone(),
                expected: desired.param_type(),
                actual: current.param_type(),
            });
        }

        if !comparison.equal(&current.value, &desired.value) {
            entries.push(DiffEntry::Mismatch {
                name: desired.name.clone(),
                old: current.value,
                new: desired.value,
            });
        }
    }

    Ok(Diff { entries })
}
