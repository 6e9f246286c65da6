//! Store-call-level retry of transport failures.

use std::time::Duration;

use tracing::{debug, error, trace, warn};

use super::{HealthReport, ParameterStore, WriteAck};
use crate::error::Result;
use crate::params::{LiveParams, ParamValue, Parameter};

/// Retry behavior for a single store call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Delay before the first retry (default: 500ms).
    pub retry_delay: Duration,
    /// Exponential backoff factor (default: 2.0).
    pub backoff_factor: f32,
    /// Maximum delay cap (default: 5000ms).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Policy with the given retry count and no delay, for tests.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let secs = (delay.as_secs_f32() * self.backoff_factor)
            .min(self.max_delay.as_secs_f32())
            .max(0.0);
        Duration::from_secs_f32(secs)
    }
}

/// Wraps a store and retries calls that fail with a transient error.
///
/// Non-transient errors and `WriteAck::Rejected` pass through untouched.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    retries: u32,
}

impl<S: ParameterStore> RetryingStore<S> {
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            retries: 0,
        }
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Retries performed so far across all calls.
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    fn call<T, F>(&mut self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut S) -> Result<T>,
    {
        let max_retries = self.policy.max_retries;
        let mut delay = self.policy.retry_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            trace!(operation, attempt, "Store call");
            match f(&mut self.inner) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Store call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt <= max_retries => {
                    warn!(
                        operation,
                        attempt,
                        max_retries,
                        error = %err,
                        delay_ms = delay.as_millis(),
                        "Transport failure, retrying"
                    );
                    self.retries += 1;
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    delay = self.policy.next_delay(delay);
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(operation, attempts = attempt, error = %err, "Transport failure, giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl<S: ParameterStore> ParameterStore for RetryingStore<S> {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn read_all(&mut self) -> Result<LiveParams> {
        self.call("read_all", |s| s.read_all())
    }

    fn read_one(&mut self, name: &str) -> Result<Parameter> {
        self.call("read_one", |s| s.read_one(name))
    }

    fn write(&mut self, name: &str, value: ParamValue) -> Result<WriteAck> {
        self.call("write", |s| s.write(name, value))
    }

    fn readiness(&mut self) -> Result<HealthReport> {
        self.call("readiness", |s| s.readiness())
    }

    fn in_air(&mut self) -> Result<bool> {
        self.call("in_air", |s| s.in_air())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.call("notify", |s| s.notify(message))
    }
}
