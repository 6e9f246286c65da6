//! Device abstraction layer.
//!
//! The sync engine talks to a flight controller only through the
//! [`ParameterStore`] trait. Implementations here are the in-memory
//! [`MockVehicle`], the JSON-backed [`FileVehicle`] used by the CLI, and the
//! [`RetryingStore`] decorator that absorbs transient transport faults.

pub mod file;
pub mod mock;
pub mod retry;

pub use file::FileVehicle;
pub use mock::{MockVehicle, MockVehicleBuilder, Operation, VehicleImage};
pub use retry::{RetryPolicy, RetryingStore};

use serde::Serialize;

use crate::error::Result;
use crate::params::{LiveParams, ParamValue, Parameter};

/// Outcome of a single parameter write that reached the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ack", rename_all = "snake_case")]
pub enum WriteAck {
    Accepted,
    Rejected { reason: String },
}

impl WriteAck {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Device-reported readiness to arm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub armable: bool,
    /// Human-readable reasons the vehicle cannot arm.
    pub failures: Vec<String>,
}

impl HealthReport {
    #[must_use]
    pub fn ready() -> Self {
        Self {
            armable: true,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_ready(failures: Vec<String>) -> Self {
        Self {
            armable: false,
            failures,
        }
    }
}

/// Read/write access to the live parameter set of one component.
///
/// # Implementation Notes
///
/// - A timeout or lost reply is reported as `SyncError::Transport`
/// - A name the device does not know is `SyncError::UnknownParameter`
/// - A write whose value type differs from the device's declared type is
///   `SyncError::TypeMismatch`; values are never coerced
/// - A device-side refusal is not an error but `WriteAck::Rejected`
pub trait ParameterStore {
    /// Identity of the device for logs and reports.
    fn describe(&self) -> String;

    /// Read the complete live parameter set.
    fn read_all(&mut self) -> Result<LiveParams>;

    /// Read a single parameter.
    fn read_one(&mut self, name: &str) -> Result<Parameter>;

    /// Write a parameter value.
    fn write(&mut self, name: &str, value: ParamValue) -> Result<WriteAck>;

    /// Query whether the device is ready to arm.
    fn readiness(&mut self) -> Result<HealthReport>;

    /// Whether the vehicle reports being airborne.
    fn in_air(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Show a status message to the operator.
    fn notify(&mut self, _message: &str) -> Result<()> {
        Ok(())
    }
}
