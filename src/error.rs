//! Error types for parameter synchronization.

use thiserror::Error;

use crate::params::ParamType;

/// Primary error type for psync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    // Device errors
    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Type mismatch for {name}: spec declares {expected}, device reports {actual}")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        actual: ParamType,
    },

    #[error("No device configured")]
    NoDevice,

    #[error("Device image error: {0}")]
    DeviceImage(String),

    // Parameter file errors
    #[error("Parameter file not found: {path}")]
    ParamFileNotFound { path: String },

    #[error("Parameter file parse error at line {line}: {reason}")]
    ParamFileParse { line: usize, reason: String },

    #[error("Remote parameter files are not supported: {url}")]
    RemoteParamFile { url: String },

    #[error("Duplicate parameter {name} for component {component}")]
    DuplicateParameter { name: String, component: String },

    #[error("Invalid value '{value}' for type {param_type}: {reason}")]
    InvalidValue {
        value: String,
        param_type: String,
        reason: String,
    },

    #[error("Component {component} not found in parameter file (available: {available:?})")]
    ComponentNotFound {
        component: String,
        available: Vec<String>,
    },

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // Persistence errors
    #[error("Version state error: {0}")]
    VersionState(String),

    #[error("Snapshot archive error: {0}")]
    Snapshot(String),

    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: i64 },

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Build a transport error for the named store operation.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true for errors that mean the device and the desired set disagree
    /// about the parameter directory itself.
    pub const fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownParameter { .. } | Self::TypeMismatch { .. }
        )
    }

    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoDevice
                | Self::ParamFileNotFound { .. }
                | Self::ParamFileParse { .. }
                | Self::RemoteParamFile { .. }
                | Self::DuplicateParameter { .. }
                | Self::ComponentNotFound { .. }
                | Self::ConfigNotFound { .. }
                | Self::ConfigInvalid(_)
                | Self::SnapshotNotFound { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoDevice => Some("Pass --device <PATH> or set `device` in the config file"),
            Self::ParamFileNotFound { .. } => {
                Some("Check the --param-file path; relative paths start at the working directory")
            }
            Self::RemoteParamFile { .. } => {
                Some("Download the file first and pass the local path with --param-file")
            }
            Self::ComponentNotFound { .. } => Some("Use --component VEHICLE:COMPONENT"),
            Self::ConfigNotFound { .. } => Some("Check the --config path or remove the flag"),
            Self::SnapshotNotFound { .. } => Some("Run: psync snapshots list"),
            Self::Transport { .. } => Some("Check the link to the vehicle and retry"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| SyncError::Other(format!("{}: {e}", f().into())))
    }
}
