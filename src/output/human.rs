//! Human-friendly output implementation using `console` styles.

use std::path::Path;

use console::{Term, measure_text_width, pad_str, Alignment};
use tracing::{debug, instrument, trace};

use crate::error::SyncError;
use crate::params::Parameter;
use crate::snapshot::{ArchivedSnapshot, SnapshotSummary};
use crate::sync::{
    ComponentReport, ConvergenceResult, ConvergenceStatus, DiffEntry, GateDecision, Readiness,
    RevertResult, SessionReport,
};
use crate::theme::PsyncTheme;

use super::{BuildInfo, DiffPlan, Output, RestoreReport, StateView};

/// Styled terminal output implementation for human users.
pub struct HumanOutput {
    theme: PsyncTheme,
    quiet: bool,
}

impl HumanOutput {
    #[instrument]
    pub fn new(quiet: bool) -> Self {
        debug!("Creating HumanOutput");
        Self {
            theme: PsyncTheme::default(),
            quiet,
        }
    }

    fn width() -> usize {
        let (_, cols) = Term::stdout().size();
        usize::from(cols).clamp(40, 100)
    }

    fn rule(&self, title: &str) {
        let width = Self::width();
        let title = format!(" {title} ");
        let fill = width.saturating_sub(measure_text_width(&title) + 2);
        println!(
            "{}{}{}",
            self.theme.accent.apply_to("──"),
            self.theme.header.apply_to(title),
            self.theme.accent.apply_to("─".repeat(fill))
        );
    }

    fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!(
            "  {} {value}",
            self.theme.label.apply_to(pad_str(label, 14, Alignment::Left, None))
        );
    }

    fn diff_entry(&self, entry: &DiffEntry) {
        match entry {
            DiffEntry::Mismatch { name, old, new } => println!(
                "    {} {} → {}",
                self.theme.param_name.apply_to(pad_str(name, 18, Alignment::Left, None)),
                self.theme.old_value.apply_to(old),
                self.theme.new_value.apply_to(new)
            ),
            DiffEntry::Absent { name, desired } => println!(
                "    {} {} {}",
                self.theme.param_name.apply_to(pad_str(name, 18, Alignment::Left, None)),
                self.theme.warning.apply_to("absent on device, wanted"),
                desired
            ),
        }
    }

    fn gate_text(gate: &GateDecision) -> String {
        match gate {
            GateDecision::Skip => "already applied".to_string(),
            GateDecision::Forced => "version check skipped".to_string(),
            GateDecision::Unversioned => "file has no version".to_string(),
            GateDecision::FirstRun => "no previous version".to_string(),
            GateDecision::Changed { from } => format!("changed from {from}"),
            GateDecision::Unreadable { error } => format!("state unreadable ({error})"),
        }
    }

    fn convergence(&self, result: &ConvergenceResult) {
        let status = match &result.status {
            ConvergenceStatus::Converged => self.theme.success.apply_to("converged".to_string()),
            ConvergenceStatus::NotReached => {
                self.theme.warning.apply_to("not reached".to_string())
            }
            ConvergenceStatus::Aborted { reason } => {
                self.theme.error.apply_to(format!("aborted: {reason}"))
            }
        };
        self.field("Convergence", status);
        self.field(
            "Writes",
            format!(
                "{} applied / {} attempted in {} round(s)",
                result.applied_count, result.writes_attempted, result.rounds_used
            ),
        );
        for failure in &result.failures {
            println!(
                "    {} round {}: {:?} {}",
                self.theme.param_name.apply_to(&failure.name),
                failure.round,
                failure.kind,
                self.theme.muted.apply_to(&failure.reason)
            );
        }
        if !result.final_diff.is_empty() {
            println!("  {}", self.theme.label.apply_to("Remaining differences"));
            for entry in result.final_diff.entries() {
                self.diff_entry(entry);
            }
        }
    }

    fn revert(&self, result: &RevertResult) {
        let summary = format!(
            "{} restored, {} unchanged, {} failed",
            result.restored_count,
            result.unchanged_count,
            result.failures.len()
        );
        if result.is_complete() {
            self.field("Revert", self.theme.success.apply_to(summary));
        } else {
            self.field("Revert", self.theme.error.apply_to(summary));
            for failure in &result.failures {
                println!(
                    "    {} {}",
                    self.theme.param_name.apply_to(&failure.name),
                    self.theme.error.apply_to(&failure.reason)
                );
            }
        }
    }

    fn component_report(&self, report: &ComponentReport) {
        if let Some(component) = report.component {
            self.field(
                "Component",
                format!(
                    "{component} {}",
                    self.theme.outcome(&report.outcome).apply_to(report.outcome.label())
                ),
            );
        }
        if let Some(id) = report.snapshot_id {
            self.field("Snapshot", format!("#{id}"));
        }
        if let Some(convergence) = &report.convergence {
            self.convergence(convergence);
        }
        match &report.readiness {
            Some(Readiness::Ready) => self.field("Readiness", self.theme.success.apply_to("ready")),
            Some(Readiness::NotReady { reason }) => self.field(
                "Readiness",
                self.theme.error.apply_to(format!("not ready: {reason}")),
            ),
            None => {}
        }
        if let Some(revert) = &report.revert {
            self.revert(revert);
        }
    }
}

impl Output for HumanOutput {
    fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!("{} {message}", self.theme.success.apply_to("[OK]").bold());
    }

    #[instrument(skip(self))]
    fn error(&self, error: &SyncError) {
        debug!(
            error = %error,
            recoverable = error.is_user_recoverable(),
            "Outputting error"
        );
        eprintln!("{} {}", self.theme.error.apply_to("[ERR]").bold(), error);
        if let SyncError::ComponentNotFound { available, .. } = error {
            eprintln!("  {}", self.theme.label.apply_to("Available components:"));
            for component in available {
                eprintln!("    - {component}");
            }
        }
        if let Some(suggestion) = error.suggestion() {
            trace!(suggestion, "Adding suggestion");
            eprintln!(
                "  {} {}",
                self.theme.label.apply_to("Suggestion:"),
                self.theme.muted.apply_to(suggestion)
            );
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {message}", self.theme.warning.apply_to("[WARN]").bold());
    }

    fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!("{} {message}", self.theme.accent.apply_to("[INFO]").bold());
    }

    #[instrument(skip_all, fields(session_id = %report.session_id))]
    fn session_report(&self, report: &SessionReport) {
        self.rule("psync session");
        println!(
            "  {}",
            self.theme
                .outcome(&report.outcome)
                .apply_to(report.outcome.label().to_uppercase())
        );
        if let Some(reason) = report.outcome.reason() {
            self.field("Reason", reason);
        }
        self.field("Device", &report.device);
        self.field("Version", &report.spec_version);
        self.field("Gate", Self::gate_text(&report.gate));
        for component in &report.components {
            self.component_report(component);
        }
        if report.version_saved {
            self.field("Saved", format!("version {}", report.spec_version));
        }
        self.field(
            "Duration",
            format!(
                "{} ms",
                (report.finished_at - report.started_at).num_milliseconds()
            ),
        );
    }

    #[instrument(skip_all)]
    fn diff_plan(&self, plan: &DiffPlan) {
        self.rule("psync diff");
        self.field("Device", &plan.device);
        self.field("Component", plan.component);
        self.field("Version", &plan.spec_version);
        self.field("Gate", Self::gate_text(&plan.gate));
        self.field(
            "Parameters",
            format!("{} desired, {} excluded", plan.desired, plan.excluded),
        );
        if plan.diff.is_empty() {
            println!("  {}", self.theme.success.apply_to("Device already matches"));
            return;
        }
        self.field(
            "Changes",
            format!("{} to write, {} absent", plan.mismatches, plan.absent),
        );
        for entry in plan.diff.entries() {
            self.diff_entry(entry);
        }
    }

    fn parameter(&self, param: &Parameter) {
        println!(
            "{} = {} {}",
            self.theme.param_name.apply_to(&param.name),
            self.theme.value.apply_to(param.value),
            self.theme.muted.apply_to(format!("({})", param.param_type()))
        );
    }

    fn version_state(&self, state: &StateView) {
        self.field("State file", &state.path);
        match (&state.version, &state.error) {
            (Some(version), _) => {
                self.field("Last applied", self.theme.value.apply_to(version));
                if let Some(at) = state.applied_at {
                    self.field("Applied at", at.to_rfc3339());
                }
                if let Some(digest) = &state.spec_digest {
                    self.field("Spec digest", self.theme.muted.apply_to(digest));
                }
            }
            (None, Some(error)) => {
                self.field("Last applied", self.theme.error.apply_to(format!("unreadable: {error}")));
            }
            (None, None) => self.field("Last applied", self.theme.muted.apply_to("none")),
        }
    }

    fn state_cleared(&self, path: &Path) {
        self.success(&format!("Version state cleared ({})", path.display()));
    }

    fn snapshot_list(&self, snapshots: &[SnapshotSummary]) {
        if snapshots.is_empty() {
            self.info("No archived snapshots");
            return;
        }
        for s in snapshots {
            println!(
                "{} {} {} {} {}",
                self.theme.value.apply_to(pad_str(&format!("#{}", s.id), 6, Alignment::Right, None)),
                self.theme.muted.apply_to(s.captured_at.format("%Y-%m-%d %H:%M:%S")),
                self.theme.accent.apply_to(format!("v{}", s.spec_version)),
                s.device,
                self.theme.label.apply_to(format!("({} params)", s.param_count))
            );
        }
    }

    fn snapshot_detail(&self, snapshot: &ArchivedSnapshot) {
        self.rule(&format!("snapshot #{}", snapshot.id));
        self.field("Session", &snapshot.session_id);
        self.field("Device", &snapshot.device);
        self.field("Version", &snapshot.spec_version);
        self.field("Captured", snapshot.captured_at.to_rfc3339());
        for param in &snapshot.params {
            print!("    ");
            self.parameter(param);
        }
    }

    fn restore_report(&self, report: &RestoreReport) {
        self.rule(&format!("restore from #{}", report.snapshot_id));
        self.field("Device", &report.device);
        self.revert(&report.result);
    }

    fn version_info(&self, info: &BuildInfo) {
        self.field("Version", self.theme.value.apply_to(info.version));
        let dirty = if info.git_dirty { " (dirty)" } else { "" };
        self.field("Git SHA", format!("{}{}", info.git_sha, self.theme.warning.apply_to(dirty)));
        self.field("Built", self.theme.muted.apply_to(info.build_timestamp));
        self.field("Rust", self.theme.muted.apply_to(info.rustc_version));
        self.field("Target", self.theme.muted.apply_to(info.target));
    }
}
