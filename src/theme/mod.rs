//! Theme system for human-mode output.

use console::Style;

use crate::sync::SessionOutcome;

/// Visual theme for `psync` human-mode output.
///
/// Centralizes styles for consistent rendering. Color is switched off
/// globally through `console::set_colors_enabled`.
pub struct PsyncTheme {
    pub accent: Style,
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    pub muted: Style,

    pub header: Style,
    pub label: Style,
    pub value: Style,
    pub param_name: Style,
    pub old_value: Style,
    pub new_value: Style,
}

impl Default for PsyncTheme {
    fn default() -> Self {
        Self {
            accent: Style::new().blue(),
            success: Style::new().green(),
            error: Style::new().red(),
            warning: Style::new().yellow(),
            muted: Style::new().dim(),
            header: Style::new().bold().blue(),
            label: Style::new().dim(),
            value: Style::new().bold(),
            param_name: Style::new().cyan(),
            old_value: Style::new().red(),
            new_value: Style::new().green(),
        }
    }
}

impl PsyncTheme {
    /// Style for a session outcome badge.
    #[must_use]
    pub fn outcome(&self, outcome: &SessionOutcome) -> Style {
        match outcome {
            SessionOutcome::Success => self.success.clone().bold(),
            SessionOutcome::Skipped => self.accent.clone().bold(),
            SessionOutcome::FailedNoRevertNeeded { .. } | SessionOutcome::FailedReverted { .. } => {
                self.warning.clone().bold()
            }
            SessionOutcome::FailedRevertIncomplete { .. } => self.error.clone().bold().reverse(),
        }
    }
}
