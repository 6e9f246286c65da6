//! Output mode abstraction for robot and human output.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::Cli;
use crate::error::SyncError;
use crate::params::{Component, Parameter, SpecVersion};
use crate::snapshot::{ArchivedSnapshot, SnapshotSummary};
use crate::sync::{Diff, GateDecision, LastApplied, RevertResult, SessionReport};

pub mod human;
pub mod robot;

pub use human::HumanOutput;
pub use robot::RobotOutput;

/// Read-only plan produced by `psync diff`.
#[derive(Debug, Clone, Serialize)]
pub struct DiffPlan {
    pub device: String,
    pub component: Component,
    pub spec_version: SpecVersion,
    /// What the version gate would decide for a real run.
    pub gate: GateDecision,
    pub desired: usize,
    pub excluded: usize,
    pub mismatches: usize,
    pub absent: usize,
    pub diff: Diff,
}

/// Persisted version state as shown by `psync state show`.
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub path: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<SpecVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StateView {
    #[must_use]
    pub fn new(path: &Path, last: &LastApplied) -> Self {
        let mut view = Self {
            path: path.display().to_string(),
            status: "missing",
            version: None,
            applied_at: None,
            spec_digest: None,
            error: None,
        };
        match last {
            LastApplied::Known(record) => {
                view.status = "known";
                view.version = Some(record.version.clone());
                view.applied_at = record.applied_at;
                view.spec_digest.clone_from(&record.spec_digest);
            }
            LastApplied::Missing => {}
            LastApplied::Corrupt(error) => {
                view.status = "corrupt";
                view.error = Some(error.clone());
            }
        }
        view
    }
}

/// Outcome of `psync restore`.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub snapshot_id: i64,
    pub device: String,
    pub complete: bool,
    #[serde(flatten)]
    pub result: RevertResult,
}

/// Build metadata for `psync version`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_sha: &'static str,
    pub git_dirty: bool,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
    pub target: &'static str,
}

/// JSON formatting options for robot mode.
#[derive(Debug, Clone, Copy)]
pub enum RobotFormat {
    /// Pretty-printed JSON (default for --robot).
    Json,
    /// Single-line JSON (--format=json-compact).
    JsonCompact,
}

/// Determines how command output is rendered.
#[derive(Debug)]
pub enum OutputMode {
    /// JSON output for agents and scripting.
    Robot(RobotFormat),
    /// Styled terminal output for human users.
    Human { quiet: bool },
}

impl OutputMode {
    /// Create OutputMode from CLI arguments.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.use_json() {
            let format = if cli.use_compact_json() {
                RobotFormat::JsonCompact
            } else {
                RobotFormat::Json
            };
            Self::Robot(format)
        } else {
            if cli.no_color {
                console::set_colors_enabled(false);
                console::set_colors_enabled_stderr(false);
            }
            Self::Human { quiet: cli.quiet }
        }
    }

    /// Convert into the appropriate Output implementation.
    #[must_use]
    pub fn into_output(self) -> Box<dyn Output> {
        match self {
            Self::Robot(format) => Box::new(RobotOutput::new(format)),
            Self::Human { quiet } => Box::new(HumanOutput::new(quiet)),
        }
    }
}

/// Trait for all output operations.
///
/// Commands call these methods without knowing the output mode.
pub trait Output {
    fn success(&self, message: &str);
    fn error(&self, error: &SyncError);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);

    fn session_report(&self, report: &SessionReport);
    fn diff_plan(&self, plan: &DiffPlan);
    fn parameter(&self, param: &Parameter);

    fn version_state(&self, state: &StateView);
    fn state_cleared(&self, path: &Path);

    fn snapshot_list(&self, snapshots: &[SnapshotSummary]);
    fn snapshot_detail(&self, snapshot: &ArchivedSnapshot);
    fn restore_report(&self, report: &RestoreReport);

    fn version_info(&self, info: &BuildInfo);
}
