//! Simulated vehicle persisted as a JSON image on disk.
//!
//! Lets the CLI run real sessions against a bench file: every accepted write
//! is saved immediately, so an interrupted run leaves the image in the same
//! state a flight controller would be in.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::mock::{MockVehicle, VehicleImage};
use super::{HealthReport, ParameterStore, WriteAck};
use crate::error::{Result, SyncError};
use crate::params::{LiveParams, ParamValue, Parameter};

pub struct FileVehicle {
    path: PathBuf,
    vehicle: MockVehicle,
}

impl FileVehicle {
    /// Load a device image.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::DeviceImage(format!(
                "device image not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let image: VehicleImage = serde_json::from_str(&text)
            .map_err(|e| SyncError::DeviceImage(format!("{}: {e}", path.display())))?;
        debug!(params = image.params.len(), "Device image loaded");

        Ok(Self {
            path: path.to_path_buf(),
            vehicle: MockVehicle::from_image(image),
        })
    }

    /// Write a new device image and open it.
    pub fn create(path: &Path, image: VehicleImage) -> Result<Self> {
        let vehicle = Self {
            path: path.to_path_buf(),
            vehicle: MockVehicle::from_image(image),
        };
        vehicle.save()?;
        Ok(vehicle)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn image(&self) -> VehicleImage {
        self.vehicle.to_image()
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.vehicle.to_image())
            .map_err(|e| SyncError::DeviceImage(e.to_string()))?;
        std::fs::write(&self.path, json + "\n")?;
        Ok(())
    }
}

impl ParameterStore for FileVehicle {
    fn describe(&self) -> String {
        format!("device image {}", self.path.display())
    }

    fn read_all(&mut self) -> Result<LiveParams> {
        self.vehicle.read_all()
    }

    fn read_one(&mut self, name: &str) -> Result<Parameter> {
        self.vehicle.read_one(name)
    }

    fn write(&mut self, name: &str, value: ParamValue) -> Result<WriteAck> {
        let ack = self.vehicle.write(name, value)?;
        if ack.is_accepted() {
            self.save()?;
        }
        Ok(ack)
    }

    fn readiness(&mut self) -> Result<HealthReport> {
        self.vehicle.readiness()
    }

    fn in_air(&mut self) -> Result<bool> {
        self.vehicle.in_air()
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        debug!(message, "Status text");
        self.vehicle.notify(message)
    }
}
