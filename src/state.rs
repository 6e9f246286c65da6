//! Durable last-applied-version state.
//!
//! The state file holds a JSON [`VersionRecord`]. A file with a single bare
//! token line, as written by earlier tooling, is read as a record without a
//! timestamp. Anything else is reported as corrupt, which the version gate
//! treats as "nothing applied yet".

use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::error::{Result, SyncError};
use crate::params::SpecVersion;
use crate::sync::version::{LastApplied, VersionRecord, VersionStore};

/// Version state stored in a local file.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(text: &str) -> std::result::Result<VersionRecord, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err("state file is empty".to_string());
        }

        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).map_err(|e| format!("invalid state JSON: {e}"));
        }

        let mut lines = trimmed.lines();
        match (lines.next(), lines.next()) {
            (Some(token), None) if !token.contains(char::is_whitespace) => Ok(VersionRecord {
                version: SpecVersion::new(token),
                applied_at: None,
                spec_digest: None,
            }),
            _ => Err("unrecognized state file format".to_string()),
        }
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self) -> LastApplied {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No version state yet");
                return LastApplied::Missing;
            }
            Err(e) => return LastApplied::Corrupt(format!("{}: {e}", self.path.display())),
        };

        let Ok(text) = String::from_utf8(bytes) else {
            return LastApplied::Corrupt("state file is not valid UTF-8".to_string());
        };

        match Self::parse(&text) {
            Ok(record) => {
                debug!(version = %record.version, "Loaded last applied version");
                LastApplied::Known(record)
            }
            Err(reason) => LastApplied::Corrupt(reason),
        }
    }

    fn save(&mut self, record: &VersionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| SyncError::VersionState(e.to_string()))?;

        // Readers only ever see a complete file.
        let tmp = self.path.with_extension("state.tmp");
        std::fs::write(&tmp, json + "\n")?;
        std::fs::rename(&tmp, &self.path)?;

        info!(version = %record.version, path = %self.path.display(), "Saved applied version");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Version state cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
