//! Post-apply flight readiness check.

use serde::Serialize;
use tracing::{info, warn};

use crate::device::ParameterStore;

/// Where readiness is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReadinessSource {
    /// The device's own health report.
    #[default]
    Health,
    /// A parameter whose non-zero value means ready.
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady { reason: String },
}

impl Readiness {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlightReadinessGuard {
    source: ReadinessSource,
}

impl FlightReadinessGuard {
    #[must_use]
    pub const fn new(source: ReadinessSource) -> Self {
        Self { source }
    }

    /// Single point-in-time check. Failing to find out counts as not ready.
    pub fn check_ready<S>(&self, store: &mut S) -> Readiness
    where
        S: ParameterStore + ?Sized,
    {
        let readiness = match &self.source {
            ReadinessSource::Health => match store.readiness() {
                Ok(report) if report.armable => Readiness::Ready,
                Ok(report) => Readiness::NotReady {
                    reason: if report.failures.is_empty() {
                        "vehicle is not armable".to_string()
                    } else {
                        report.failures.join("; ")
                    },
                },
                Err(e) => Readiness::NotReady {
                    reason: format!("readiness unknown: {e}"),
                },
            },
            ReadinessSource::Parameter(name) => match store.read_one(name) {
                Ok(param) if param.value.is_truthy() => Readiness::Ready,
                Ok(param) => Readiness::NotReady {
                    reason: format!("{name} = {}", param.value),
                },
                Err(e) => Readiness::NotReady {
                    reason: format!("readiness unknown: {e}"),
                },
            },
        };

        match &readiness {
            Readiness::Ready => info!("Vehicle ready to arm"),
            Readiness::NotReady { reason } => warn!(%reason, "Vehicle not ready to arm"),
        }
        readiness
    }
}
