//! Robot mode JSON output implementation.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::error::SyncError;
use crate::params::Parameter;
use crate::snapshot::{ArchivedSnapshot, SnapshotSummary};
use crate::sync::SessionReport;

use super::{BuildInfo, DiffPlan, Output, RestoreReport, RobotFormat, StateView};

/// JSON output implementation for agents and scripting.
///
/// Field names are part of the interface; scripts match on them.
pub struct RobotOutput {
    format: RobotFormat,
}

impl RobotOutput {
    #[instrument]
    pub fn new(format: RobotFormat) -> Self {
        debug!(?format, "Creating RobotOutput");
        Self { format }
    }

    /// Serialize `data` in the configured format.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> String {
        let json = match self.format {
            RobotFormat::Json => serde_json::to_string_pretty(data),
            RobotFormat::JsonCompact => serde_json::to_string(data),
        };
        json.unwrap_or_else(|e| {
            serde_json::json!({ "error": true, "message": format!("serialization failed: {e}") })
                .to_string()
        })
    }

    fn output_json<T: Serialize + ?Sized>(&self, data: &T) {
        let json = self.render(data);
        trace!(json_len = json.len(), "JSON serialized");
        println!("{json}");
    }
}

/// Error payload written to stderr in robot mode.
pub fn error_json(error: &SyncError) -> serde_json::Value {
    serde_json::json!({
        "error": true,
        "message": error.to_string(),
        "suggestion": error.suggestion(),
        "recoverable": error.is_user_recoverable(),
    })
}

impl Output for RobotOutput {
    #[instrument(skip(self))]
    fn success(&self, message: &str) {
        self.output_json(&serde_json::json!({
            "success": true,
            "message": message
        }));
    }

    #[instrument(skip(self))]
    fn error(&self, error: &SyncError) {
        debug!(error = %error, "Robot: error");
        let json = serde_json::to_string_pretty(&error_json(error))
            .unwrap_or_else(|_| error.to_string());
        eprintln!("{json}");
    }

    /// Warnings go to stderr so stdout stays one JSON document.
    #[instrument(skip(self))]
    fn warning(&self, message: &str) {
        eprintln!("{}", self.render(&serde_json::json!({
            "warning": true,
            "message": message
        })));
    }

    #[instrument(skip(self))]
    fn info(&self, message: &str) {
        self.output_json(&serde_json::json!({
            "info": true,
            "message": message
        }));
    }

    #[instrument(skip_all, fields(session_id = %report.session_id))]
    fn session_report(&self, report: &SessionReport) {
        debug!(outcome = report.outcome.label(), "Robot: session_report");
        self.output_json(report);
    }

    #[instrument(skip_all)]
    fn diff_plan(&self, plan: &DiffPlan) {
        self.output_json(plan);
    }

    #[instrument(skip_all, fields(name = %param.name))]
    fn parameter(&self, param: &Parameter) {
        self.output_json(param);
    }

    #[instrument(skip_all)]
    fn version_state(&self, state: &StateView) {
        self.output_json(state);
    }

    #[instrument(skip(self))]
    fn state_cleared(&self, path: &Path) {
        self.output_json(&serde_json::json!({
            "cleared": true,
            "path": path.display().to_string()
        }));
    }

    #[instrument(skip_all, fields(count = snapshots.len()))]
    fn snapshot_list(&self, snapshots: &[SnapshotSummary]) {
        self.output_json(snapshots);
    }

    #[instrument(skip_all, fields(id = snapshot.id))]
    fn snapshot_detail(&self, snapshot: &ArchivedSnapshot) {
        self.output_json(snapshot);
    }

    #[instrument(skip_all, fields(id = report.snapshot_id))]
    fn restore_report(&self, report: &RestoreReport) {
        self.output_json(report);
    }

    #[instrument(skip_all)]
    fn version_info(&self, info: &BuildInfo) {
        self.output_json(info);
    }
}
