//! Layered configuration for `psync`.
//!
//! Values come from a TOML or YAML file (format by extension), then from
//! `PSYNC_*` environment variables, then from CLI flags applied by the
//! command layer.
//!
//! # Example TOML
//!
//! ```toml
//! param_file = "~/params/reference.params"
//! device = "bench.json"
//! max_convergence_rounds = 5
//! settle_delay_ms = 2000
//! exclude = ["CAL_MAG*", "SYS_HAS_*", "SENS_*_AUTOCAL"]
//!
//! [retry]
//! max_retries = 3
//! delay_ms = 500
//! ```

mod path;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace};

use crate::device::RetryPolicy;
use crate::error::{Result, SyncError};
use crate::params::{Component, ParamFilter};
use crate::sync::converge::{DEFAULT_MAX_ROUNDS, DEFAULT_SETTLE_DELAY};
use crate::sync::{ConvergenceOptions, ReadinessSource, ValueComparison};

pub use path::{default_config_path, default_state_path, home_dir, resolve_path};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PSYNC_";

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Log verbosity accepted by `--loglevel` and `PSYNC_LOGLEVEL`.
///
/// Accepts level names (`DEBUG`, `WARNING`, `CRITICAL`, ...) in any case, or
/// the numeric levels 10 through 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `tracing` level name used in filter directives.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Default filter directive for this crate.
    #[must_use]
    pub fn directive(self) -> String {
        format!("psync={}", self.as_str())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Ok(match n {
                0..=9 => Self::Trace,
                10..=19 => Self::Debug,
                20..=29 => Self::Info,
                30..=39 => Self::Warn,
                _ => Self::Error,
            });
        }
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" | "CRITICAL" | "FATAL" => Ok(Self::Error),
            _ => Err(SyncError::ConfigInvalid(format!(
                "Unknown log level '{s}': expected TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL or 10-50"
            ))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Store-call retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay_ms: u64,
    pub backoff_factor: f32,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            delay_ms: u64::try_from(policy.retry_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_factor: policy.backoff_factor,
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Complete `psync` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Parameter file path.
    pub param_file: Option<String>,
    /// Simulated vehicle image the CLI talks to.
    pub device: Option<PathBuf>,
    /// `VEHICLE:COMPONENT` to sync when the file holds several.
    pub component: Option<String>,
    pub skip_version_check: bool,
    pub max_convergence_rounds: u32,
    pub settle_delay_ms: u64,
    /// Relative tolerance for real values; exact comparison when unset.
    pub tolerance: Option<f64>,
    /// Parameter read for readiness instead of the device health report.
    pub readiness_param: Option<String>,
    /// Glob patterns of parameters never written.
    pub exclude: Vec<String>,
    pub state_file: Option<PathBuf>,
    pub snapshot_db: Option<PathBuf>,
    /// Archive every pre-sync snapshot.
    pub archive: bool,
    /// Number of archived snapshots kept after each session.
    pub keep_snapshots: Option<usize>,
    pub loglevel: Option<LogLevel>,
    pub retry: RetryConfig,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            param_file: None,
            device: None,
            component: None,
            skip_version_check: false,
            max_convergence_rounds: DEFAULT_MAX_ROUNDS,
            settle_delay_ms: u64::try_from(DEFAULT_SETTLE_DELAY.as_millis()).unwrap_or(2000),
            tolerance: None,
            readiness_param: None,
            exclude: Vec::new(),
            state_file: None,
            snapshot_db: None,
            archive: true,
            keep_snapshots: None,
            loglevel: None,
            retry: RetryConfig::default(),
            base_dir: None,
        }
    }
}

impl SyncConfig {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_convergence_rounds == 0 {
            return Err(SyncError::ConfigInvalid(
                "max_convergence_rounds must be at least 1".to_string(),
            ));
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0) {
            return Err(SyncError::ConfigInvalid(format!(
                "retry.backoff_factor must be >= 1.0, got {}",
                self.retry.backoff_factor
            )));
        }
        if let Some(tolerance) = self.tolerance {
            if !(tolerance.is_finite() && (0.0..1.0).contains(&tolerance)) {
                return Err(SyncError::ConfigInvalid(format!(
                    "tolerance must be in [0, 1), got {tolerance}"
                )));
            }
        }
        self.component()?;
        if self.exclude.iter().any(|p| p.trim().is_empty()) {
            return Err(SyncError::ConfigInvalid(
                "exclude patterns must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `PSYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `PSYNC_*` overrides from a lookup function.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, v)) = get("PARAM_FILE") {
            self.param_file = Some(v);
        }
        if let Some((_, v)) = get("DEVICE") {
            self.device = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("COMPONENT") {
            self.component = Some(v);
        }
        if let Some((key, v)) = get("SKIP_VERSION_CHECK") {
            self.skip_version_check = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = get("MAX_ROUNDS") {
            self.max_convergence_rounds = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = get("SETTLE_DELAY_MS") {
            self.settle_delay_ms = parse_env(&key, &v)?;
        }
        if let Some((key, v)) = get("TOLERANCE") {
            self.tolerance = Some(parse_env(&key, &v)?);
        }
        if let Some((_, v)) = get("READINESS_PARAM") {
            self.readiness_param = Some(v);
        }
        if let Some((_, v)) = get("EXCLUDE") {
            self.exclude = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some((_, v)) = get("STATE_FILE") {
            self.state_file = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("SNAPSHOT_DB") {
            self.snapshot_db = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("LOGLEVEL") {
            self.loglevel = Some(v.parse()?);
        }
        if let Some((key, v)) = get("MAX_RETRIES") {
            self.retry.max_retries = parse_env(&key, &v)?;
        }

        self.validate()
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        resolve_path(path, &base)
    }

    /// Resolved parameter file source. URLs pass through untouched.
    pub fn param_file_source(&self) -> Result<Option<String>> {
        match &self.param_file {
            Some(source) if source.contains("://") => Ok(Some(source.clone())),
            Some(source) => Ok(Some(
                self.resolve(Path::new(source))?.display().to_string(),
            )),
            None => Ok(None),
        }
    }

    pub fn device_path(&self) -> Result<Option<PathBuf>> {
        self.device.as_deref().map(|p| self.resolve(p)).transpose()
    }

    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => self.resolve(path),
            None => default_state_path(),
        }
    }

    pub fn snapshot_db_path(&self) -> Result<PathBuf> {
        match &self.snapshot_db {
            Some(path) => self.resolve(path),
            None => crate::snapshot::default_db_path(),
        }
    }

    pub fn component(&self) -> Result<Option<Component>> {
        self.component
            .as_deref()
            .map(|c| {
                c.parse()
                    .map_err(|e| SyncError::ConfigInvalid(format!("component: {e}")))
            })
            .transpose()
    }

    #[must_use]
    pub fn comparison(&self) -> ValueComparison {
        self.tolerance
            .map_or(ValueComparison::Exact, ValueComparison::Relative)
    }

    #[must_use]
    pub fn convergence_options(&self) -> ConvergenceOptions {
        ConvergenceOptions {
            max_rounds: self.max_convergence_rounds,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            comparison: self.comparison(),
        }
    }

    #[must_use]
    pub fn readiness_source(&self) -> ReadinessSource {
        self.readiness_param
            .clone()
            .map_or(ReadinessSource::Health, ReadinessSource::Parameter)
    }

    #[must_use]
    pub fn param_filter(&self) -> ParamFilter {
        ParamFilter::new(&self.exclude)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::ConfigInvalid(format!("{key}: invalid value '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SyncError::ConfigInvalid(format!(
            "{key}: expected a boolean, got '{value}'"
        ))),
    }
}

/// Load configuration from a file.
///
/// Automatically detects the format from the file extension:
/// - `.yaml` or `.yml` → YAML
/// - `.toml` → TOML
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path = path.as_ref();
    info!("Loading configuration file");

    let format = ConfigFormat::from_extension(path).ok_or_else(|| {
        SyncError::ConfigParse(format!(
            "Unknown config format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })?;
    debug!(format = ?format, "Detected config format");

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SyncError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            SyncError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), "Read config file");

    let mut config = load_config_from_str(&content, format)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
}

/// Parse and validate configuration text.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<SyncConfig> {
    let config: SyncConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| SyncError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| SyncError::ConfigParse(format!("TOML: {e}")))?
        }
    };

    config.validate()?;

    debug!(
        param_file = ?config.param_file,
        max_rounds = config.max_convergence_rounds,
        exclude = config.exclude.len(),
        "Configuration parsed"
    );
    Ok(config)
}

/// Resolve the effective configuration: an explicit file (which must exist),
/// else the default file when present, else defaults; then environment
/// overrides.
#[instrument]
pub fn resolve_config(explicit: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Some(path) if path.is_file() => load_config(&path)?,
            _ => {
                trace!("No config file, using defaults");
                SyncConfig::default()
            }
        },
    };
    config.apply_env()?;
    Ok(config)
}
