//! Process environment guards for tests that read `PSYNC_*` directly.

use env_lock::{EnvGuard as LockedEnvGuard, lock_env};
use tracing::trace;

/// Holds the process-wide env lock and restores the variable on drop.
pub struct EnvGuard<'a> {
    _guard: LockedEnvGuard<'a>,
}

impl<'a> EnvGuard<'a> {
    #[must_use]
    pub fn set(key: &'a str, value: &str) -> Self {
        trace!(key, value, "Setting env var");
        Self {
            _guard: lock_env([(key, Some(value))]),
        }
    }

    #[must_use]
    pub fn remove(key: &'a str) -> Self {
        trace!(key, "Removing env var");
        Self {
            _guard: lock_env([(key, None::<&str>)]),
        }
    }
}
