//! Simulated vehicle for tests and dry runs.
//!
//! [`MockVehicle`] keeps a live parameter table in memory, records every
//! store operation, and can be configured to misbehave the ways real
//! autopilots do: transient timeouts, nacks, range limits, values rounded on
//! write, writes that never stick, and parameters that only appear after a
//! trigger parameter is set.
//!
//! # Example
//!
//! ```rust,ignore
//! use psync::device::mock::{MockVehicle, Operation};
//! use psync::device::ParameterStore;
//! use psync::params::ParamValue;
//!
//! let mut mock = MockVehicle::builder()
//!     .param("MPC_Z_P", ParamValue::Real32(3.0))
//!     .build();
//!
//! mock.write("MPC_Z_P", ParamValue::Real32(4.0)).unwrap();
//!
//! mock.assert_operations(&[Operation::Write {
//!     name: "MPC_Z_P".to_string(),
//!     value: ParamValue::Real32(4.0),
//! }]);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{HealthReport, ParameterStore, WriteAck};
use crate::error::{Result, SyncError};
use crate::params::{LiveParams, ParamValue, Parameter, live_params};

/// Recorded operation for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ReadAll,
    ReadOne { name: String },
    Write { name: String, value: ParamValue },
    Readiness,
    InAir,
    Notify { message: String },
}

/// Parameters that appear once `trigger` is written with the value `when`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reveal {
    pub trigger: String,
    pub when: f64,
    pub params: Vec<Parameter>,
}

/// Serializable description of a simulated vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleImage {
    pub name: Option<String>,
    pub params: Vec<Parameter>,
    /// Inclusive `[min, max]` accepted by the device per parameter.
    pub limits: BTreeMap<String, [f64; 2]>,
    pub reveals: Vec<Reveal>,
    /// The vehicle refuses to arm while any of these values is live.
    pub not_ready_when: Vec<Parameter>,
    pub in_air: bool,
    /// Decimal places the device keeps for real values.
    pub round_reals_to: Option<u8>,
}

/// In-memory vehicle implementing [`ParameterStore`].
#[derive(Debug, Clone)]
pub struct MockVehicle {
    name: String,
    params: LiveParams,
    limits: BTreeMap<String, [f64; 2]>,
    reveals: Vec<Reveal>,
    not_ready_when: Vec<Parameter>,
    in_air: bool,
    round_reals_to: Option<u8>,
    rejected: HashMap<String, String>,
    stuck: HashSet<String>,
    failing_writes: HashSet<String>,
    fail_read_all: bool,
    pending_faults: usize,
    readiness_override: Option<HealthReport>,
    operation_log: Vec<Operation>,
    notices: Vec<String>,
}

impl Default for MockVehicle {
    fn default() -> Self {
        Self::from_image(VehicleImage::default())
    }
}

impl MockVehicle {
    #[must_use]
    pub fn builder() -> MockVehicleBuilder {
        MockVehicleBuilder::default()
    }

    /// Vehicle with the given live parameters and no special behavior.
    pub fn with_params<I: IntoIterator<Item = Parameter>>(params: I) -> Self {
        Self {
            params: live_params(params),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_image(image: VehicleImage) -> Self {
        debug!(
            params = image.params.len(),
            reveals = image.reveals.len(),
            "Creating simulated vehicle"
        );
        Self {
            name: image.name.unwrap_or_else(|| "mock-vehicle".to_string()),
            params: live_params(image.params),
            limits: image.limits,
            reveals: image.reveals,
            not_ready_when: image.not_ready_when,
            in_air: image.in_air,
            round_reals_to: image.round_reals_to,
            rejected: HashMap::new(),
            stuck: HashSet::new(),
            failing_writes: HashSet::new(),
            fail_read_all: false,
            pending_faults: 0,
            readiness_override: None,
            operation_log: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Current state as a serializable image.
    #[must_use]
    pub fn to_image(&self) -> VehicleImage {
        VehicleImage {
            name: Some(self.name.clone()),
            params: self.params.values().cloned().collect(),
            limits: self.limits.clone(),
            reveals: self.reveals.clone(),
            not_ready_when: self.not_ready_when.clone(),
            in_air: self.in_air,
            round_reals_to: self.round_reals_to,
        }
    }

    // === State access ===

    #[must_use]
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name).map(|p| p.value)
    }

    #[must_use]
    pub fn params(&self) -> &LiveParams {
        &self.params
    }

    /// Change a value behind the engine's back.
    pub fn set_value(&mut self, name: &str, value: ParamValue) {
        self.params
            .insert(name.to_string(), Parameter::new(name, value));
    }

    pub fn set_in_air(&mut self, in_air: bool) {
        self.in_air = in_air;
    }

    /// Fail the next `count` store calls with a transport error.
    pub fn fail_next(&mut self, count: usize) {
        self.pending_faults = count;
    }

    /// Status messages sent to the operator.
    #[must_use]
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    // === Assertions ===

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operation_log
    }

    /// Writes in the order they were issued.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, ParamValue)> {
        self.operation_log
            .iter()
            .filter_map(|op| match op {
                Operation::Write { name, value } => Some((name.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.operation_log
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    /// Assert specific operations were performed.
    ///
    /// # Panics
    ///
    /// Panics if the operations don't match.
    pub fn assert_operations(&self, expected: &[Operation]) {
        let actual = self.operations();
        assert_eq!(
            actual, expected,
            "Operation mismatch.\nExpected: {expected:#?}\nActual: {actual:#?}",
        );
    }

    /// Assert no write reached the device.
    ///
    /// # Panics
    ///
    /// Panics if any write was recorded.
    pub fn assert_no_writes(&self) {
        let writes = self.writes();
        assert!(writes.is_empty(), "Expected no writes, but found: {writes:#?}");
    }

    /// Assert a specific operation was performed at least once.
    ///
    /// # Panics
    ///
    /// Panics if the operation was not found.
    pub fn assert_contains(&self, expected: &Operation) {
        let ops = self.operations();
        assert!(
            ops.contains(expected),
            "Expected operation {expected:?} not found in: {ops:#?}",
        );
    }

    pub fn clear_operations(&mut self) {
        self.operation_log.clear();
    }

    // === Internal Helpers ===

    fn record_op(&mut self, op: Operation) {
        trace!(?op, "Recording operation");
        self.operation_log.push(op);
    }

    fn check_fault(&mut self, operation: &str) -> Result<()> {
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return Err(SyncError::transport(operation, "no reply (simulated)"));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn stored_value(&self, value: ParamValue) -> ParamValue {
        let Some(places) = self.round_reals_to else {
            return value;
        };
        let scale = 10_f64.powi(i32::from(places));
        match value {
            ParamValue::Real32(v) => {
                ParamValue::Real32(((f64::from(v) * scale).round() / scale) as f32)
            }
            ParamValue::Real64(v) => ParamValue::Real64((v * scale).round() / scale),
            other => other,
        }
    }

    fn apply_reveals(&mut self, name: &str, value: ParamValue) {
        let (fired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.reveals)
            .into_iter()
            .partition(|r| r.trigger == name && r.when == value.as_f64());
        self.reveals = pending;

        for reveal in fired {
            for param in reveal.params {
                debug!(trigger = %name, name = %param.name, "Parameter revealed");
                self.params.entry(param.name.clone()).or_insert(param);
            }
        }
    }
}

impl ParameterStore for MockVehicle {
    fn describe(&self) -> String {
        format!("simulated vehicle '{}'", self.name)
    }

    fn read_all(&mut self) -> Result<LiveParams> {
        self.check_fault("read_all")?;
        self.record_op(Operation::ReadAll);
        if self.fail_read_all {
            return Err(SyncError::transport("read_all", "parameter list incomplete"));
        }
        Ok(self.params.clone())
    }

    fn read_one(&mut self, name: &str) -> Result<Parameter> {
        self.check_fault("read_one")?;
        self.record_op(Operation::ReadOne {
            name: name.to_string(),
        });
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn write(&mut self, name: &str, value: ParamValue) -> Result<WriteAck> {
        self.check_fault("write")?;
        self.record_op(Operation::Write {
            name: name.to_string(),
            value,
        });

        if self.failing_writes.contains(name) {
            return Err(SyncError::transport("write", format!("no ack for {name}")));
        }

        let current = self
            .params
            .get(name)
            .ok_or_else(|| SyncError::UnknownParameter {
                name: name.to_string(),
            })?;
        if current.param_type() != value.param_type() {
            return Err(SyncError::TypeMismatch {
                name: name.to_string(),
                expected: value.param_type(),
                actual: current.param_type(),
            });
        }

        if let Some(reason) = self.rejected.get(name) {
            return Ok(WriteAck::Rejected {
                reason: reason.clone(),
            });
        }
        if let Some(&[min, max]) = self.limits.get(name) {
            let v = value.as_f64();
            if v < min || v > max {
                return Ok(WriteAck::Rejected {
                    reason: format!("{value} outside [{min}, {max}]"),
                });
            }
        }
        if self.stuck.contains(name) {
            trace!(name, "Write acknowledged but not stored");
            return Ok(WriteAck::Accepted);
        }

        let stored = self.stored_value(value);
        self.params
            .insert(name.to_string(), Parameter::new(name, stored));
        self.apply_reveals(name, stored);
        Ok(WriteAck::Accepted)
    }

    fn readiness(&mut self) -> Result<HealthReport> {
        self.check_fault("readiness")?;
        self.record_op(Operation::Readiness);
        if let Some(report) = &self.readiness_override {
            return Ok(report.clone());
        }

        let failures: Vec<String> = self
            .not_ready_when
            .iter()
            .filter(|bad| self.params.get(&bad.name).is_some_and(|p| p.value == bad.value))
            .map(|bad| format!("{} = {} prevents arming", bad.name, bad.value))
            .collect();

        if failures.is_empty() {
            Ok(HealthReport::ready())
        } else {
            Ok(HealthReport::not_ready(failures))
        }
    }

    fn in_air(&mut self) -> Result<bool> {
        self.check_fault("in_air")?;
        self.record_op(Operation::InAir);
        Ok(self.in_air)
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.check_fault("notify")?;
        self.record_op(Operation::Notify {
            message: message.to_string(),
        });
        self.notices.push(message.to_string());
        Ok(())
    }
}

/// Builder for creating `MockVehicle` with common configurations.
#[derive(Debug, Default)]
pub struct MockVehicleBuilder {
    image: VehicleImage,
    rejected: HashMap<String, String>,
    stuck: HashSet<String>,
    failing_writes: HashSet<String>,
    fail_read_all: bool,
    faults: usize,
    readiness_override: Option<HealthReport>,
}

impl MockVehicleBuilder {
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.image.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: ParamValue) -> Self {
        self.image.params.push(Parameter::new(name, value));
        self
    }

    /// Only accept values in `[min, max]`; others are nacked.
    #[must_use]
    pub fn limit(mut self, name: &str, min: f64, max: f64) -> Self {
        self.image.limits.insert(name.to_string(), [min, max]);
        self
    }

    /// Make `params` appear once `trigger` is set to `when`.
    #[must_use]
    pub fn reveal(mut self, trigger: &str, when: f64, params: Vec<Parameter>) -> Self {
        self.image.reveals.push(Reveal {
            trigger: trigger.to_string(),
            when,
            params,
        });
        self
    }

    #[must_use]
    pub fn not_ready_when(mut self, name: &str, value: ParamValue) -> Self {
        self.image.not_ready_when.push(Parameter::new(name, value));
        self
    }

    /// Always report this readiness, regardless of parameter values.
    #[must_use]
    pub fn readiness(mut self, report: HealthReport) -> Self {
        self.readiness_override = Some(report);
        self
    }

    #[must_use]
    pub fn in_air(mut self) -> Self {
        self.image.in_air = true;
        self
    }

    #[must_use]
    pub fn round_reals_to(mut self, places: u8) -> Self {
        self.image.round_reals_to = Some(places);
        self
    }

    /// Nack every write to `name`.
    #[must_use]
    pub fn reject(mut self, name: &str, reason: &str) -> Self {
        self.rejected.insert(name.to_string(), reason.to_string());
        self
    }

    /// Acknowledge writes to `name` without storing them.
    #[must_use]
    pub fn stuck(mut self, name: &str) -> Self {
        self.stuck.insert(name.to_string());
        self
    }

    /// Every write to `name` times out.
    #[must_use]
    pub fn failing_write(mut self, name: &str) -> Self {
        self.failing_writes.insert(name.to_string());
        self
    }

    /// Every `read_all` fails with a transport error.
    #[must_use]
    pub fn failing_read_all(mut self) -> Self {
        self.fail_read_all = true;
        self
    }

    /// Fail the first `count` store calls with a transport error.
    #[must_use]
    pub fn transient_faults(mut self, count: usize) -> Self {
        self.faults = count;
        self
    }

    #[must_use]
    pub fn build(self) -> MockVehicle {
        let mut vehicle = MockVehicle::from_image(self.image);
        vehicle.rejected = self.rejected;
        vehicle.stuck = self.stuck;
        vehicle.failing_writes = self.failing_writes;
        vehicle.fail_read_all = self.fail_read_all;
        vehicle.pending_faults = self.faults;
        vehicle.readiness_override = self.readiness_override;
        vehicle
    }
}
