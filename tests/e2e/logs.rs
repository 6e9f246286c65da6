//! Assertions on the tracing output a run writes to stderr.

/// Log lines captured from stderr.
///
/// ```ignore
/// LogVerifier::from_stderr(&result.stderr)
///     .assert_info("parameters updated")
///     .assert_no_errors();
/// ```
pub struct LogVerifier {
    lines: Vec<String>,
}

impl LogVerifier {
    #[must_use]
    pub fn from_stderr(stderr: &str) -> Self {
        Self {
            lines: stderr.lines().map(String::from).collect(),
        }
    }

    /// Message matching ignores case.
    fn has(&self, level: &str, message: &str) -> bool {
        let message = message.to_lowercase();
        self.lines
            .iter()
            .any(|line| line.contains(level) && line.to_lowercase().contains(&message))
    }

    fn assert_level(&self, level: &str, message: &str) -> &Self {
        assert!(
            self.has(level, message),
            "No {level} line containing \"{message}\" in:\n{}",
            self.lines.join("\n")
        );
        self
    }

    #[must_use]
    pub fn assert_debug(&self, message: &str) -> &Self {
        self.assert_level("DEBUG", message)
    }

    #[must_use]
    pub fn assert_info(&self, message: &str) -> &Self {
        self.assert_level("INFO", message)
    }

    #[must_use]
    pub fn assert_no_errors(&self) -> &Self {
        let errors: Vec<&String> = self.lines.iter().filter(|l| l.contains("ERROR")).collect();
        assert!(errors.is_empty(), "Unexpected ERROR lines:\n{errors:#?}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
2026-01-01T00:00:00Z DEBUG psync: Effective configuration
2026-01-01T00:00:01Z  INFO psync::sync::session: Parameters updated version=\"2\"";

    #[test]
    fn test_levels_and_case() {
        let logs = LogVerifier::from_stderr(SAMPLE);
        let _ = logs
            .assert_debug("effective configuration")
            .assert_info("PARAMETERS UPDATED")
            .assert_no_errors();
        assert!(!logs.has("DEBUG", "parameters updated"));
    }

    #[test]
    #[should_panic(expected = "Unexpected ERROR lines")]
    fn test_error_lines_fail() {
        let _ = LogVerifier::from_stderr("ERROR psync: Device unreachable").assert_no_errors();
    }
}
