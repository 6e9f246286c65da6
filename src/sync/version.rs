//! Version gating against the last successfully applied spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::params::SpecVersion;

/// What is persisted after a fully successful session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: SpecVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// SHA-256 of the applied spec, for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_digest: Option<String>,
}

impl VersionRecord {
    /// Record for a version applied now.
    pub fn applied_now(version: SpecVersion, spec_digest: impl Into<String>) -> Self {
        Self {
            version,
            applied_at: Some(Utc::now()),
            spec_digest: Some(spec_digest.into()),
        }
    }
}

/// Result of reading the persisted last-applied version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastApplied {
    Known(VersionRecord),
    Missing,
    /// Storage exists but could not be read or understood.
    Corrupt(String),
}

impl LastApplied {
    #[must_use]
    pub fn version(&self) -> Option<&SpecVersion> {
        match self {
            Self::Known(record) => Some(&record.version),
            Self::Missing | Self::Corrupt(_) => None,
        }
    }
}

/// Durable storage of the last applied version.
pub trait VersionStore {
    /// Never fails; problems are reported as [`LastApplied::Corrupt`].
    fn load(&self) -> LastApplied;

    fn save(&mut self, record: &VersionRecord) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}

/// Decide whether a sync attempt should run.
///
/// A file without a version always runs.
#[must_use]
pub fn should_proceed(
    spec_version: &SpecVersion,
    last_applied: Option<&SpecVersion>,
    skip_check: bool,
) -> bool {
    skip_check || spec_version.is_empty() || last_applied != Some(spec_version)
}

/// Why the gate let a session through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateDecision {
    Skip,
    Forced,
    /// The parameter file carries no version.
    Unversioned,
    FirstRun,
    Changed { from: SpecVersion },
    Unreadable { error: String },
}

impl GateDecision {
    #[must_use]
    pub const fn proceeds(&self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Evaluate the gate against a version store, logging the decision.
pub fn evaluate_gate(
    spec_version: &SpecVersion,
    store: &dyn VersionStore,
    skip_check: bool,
) -> GateDecision {
    if skip_check {
        debug!(version = %spec_version, "Version check skipped");
        return GateDecision::Forced;
    }
    if spec_version.is_empty() {
        debug!("Parameter file has no version, not gating");
        return GateDecision::Unversioned;
    }

    let last = store.load();
    if !should_proceed(spec_version, last.version(), false) {
        return GateDecision::Skip;
    }

    match last {
        LastApplied::Known(record) => GateDecision::Changed {
            from: record.version,
        },
        LastApplied::Missing => GateDecision::FirstRun,
        LastApplied::Corrupt(error) => {
            warn!(%error, "Last applied version unreadable, treating as first run");
            GateDecision::Unreadable { error }
        }
    }
}

/// In-memory version store.
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionStore {
    state: Option<LastApplied>,
    saves: usize,
}

impl MemoryVersionStore {
    #[must_use]
    pub fn with_version(version: &str) -> Self {
        Self {
            state: Some(LastApplied::Known(VersionRecord {
                version: SpecVersion::new(version),
                applied_at: None,
                spec_digest: None,
            })),
            saves: 0,
        }
    }

    #[must_use]
    pub fn corrupt(reason: &str) -> Self {
        Self {
            state: Some(LastApplied::Corrupt(reason.to_string())),
            saves: 0,
        }
    }

    /// Number of successful saves.
    #[must_use]
    pub const fn saves(&self) -> usize {
        self.saves
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> LastApplied {
        self.state.clone().unwrap_or(LastApplied::Missing)
    }

    fn save(&mut self, record: &VersionRecord) -> Result<()> {
        self.state = Some(LastApplied::Known(record.clone()));
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.state = None;
        Ok(())
    }
}
