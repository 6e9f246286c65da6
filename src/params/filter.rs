//! Exclusion patterns for parameters that must never be written.
//!
//! Patterns are globs where `*` matches any run of characters and `?` a
//! single character, e.g. `CAL_MAG*` or `SENS_*_AUTOCAL`.

use tracing::debug;

use super::ParameterSpec;

#[derive(Debug, Clone, Default)]
pub struct ParamFilter {
    patterns: Vec<String>,
}

impl ParamFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if `name` matches any exclusion pattern.
    #[must_use]
    pub fn excludes(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| glob_match(p, name))
    }

    /// Spec with excluded parameters removed.
    #[must_use]
    pub fn apply(&self, spec: &ParameterSpec) -> ParameterSpec {
        if self.is_empty() {
            return spec.clone();
        }
        let filtered = spec.filtered(|p| !self.excludes(&p.name));
        let dropped = spec.len() - filtered.len();
        if dropped > 0 {
            debug!(dropped, "Excluded parameters from spec");
        }
        filtered
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == b'?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}
