//! Test fixture helpers for creating temporary test data.
//!
//! A [`TestWorkspace`] is a temporary directory holding a parameter file, a
//! device image and the state/archive paths for one scenario. Everything is
//! removed when the workspace is dropped.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

/// One row of a parameter file: vehicle, component, name, value, type tag.
pub type Row<'a> = (u8, u8, &'a str, &'a str, u8);

/// MAVLink tag of `REAL32` as used in parameter files.
pub const REAL32: u8 = 9;
/// MAVLink tag of `INT32` as used in parameter files.
pub const INT32: u8 = 6;

/// Temporary directory laid out for a psync scenario.
///
/// # Example
///
/// ```ignore
/// let ws = TestWorkspace::new();
/// let params = ws.param_file("2", &[("MPC_Z_P", "4.0", REAL32)]);
/// let device = ws.device(&[real32("MPC_Z_P", 3.0)]);
/// ```
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a raw file into the workspace.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)
            .unwrap_or_else(|e| panic!("Failed to write {}: {e}", path.display()));
        path
    }

    /// Parameter file `ref.params` for component 1:1.
    pub fn param_file(&self, version: &str, params: &[(&str, &str, u8)]) -> PathBuf {
        let rows: Vec<Row<'_>> = params
            .iter()
            .map(|&(name, value, tag)| (1, 1, name, value, tag))
            .collect();
        self.param_file_rows("ref.params", version, &rows)
    }

    /// Parameter file in the exported tab-separated format.
    pub fn param_file_rows(&self, name: &str, version: &str, rows: &[Row<'_>]) -> PathBuf {
        self.write(name, &param_file_text(version, rows))
    }

    /// Device image `vehicle.json` with the given live parameters.
    pub fn device(&self, params: &[Value]) -> PathBuf {
        self.device_image(&json!({ "name": "bench", "params": params }))
    }

    /// Device image from a full JSON description.
    ///
    /// # Panics
    ///
    /// Panics if the image cannot be serialized.
    pub fn device_image(&self, image: &Value) -> PathBuf {
        let text = serde_json::to_string_pretty(image).expect("Failed to serialize device image");
        self.write("vehicle.json", &text)
    }

    /// Live value of a parameter in a device image, as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the image cannot be read or parsed.
    #[must_use]
    pub fn device_value(&self, device: &Path, name: &str) -> Option<Value> {
        let text = std::fs::read_to_string(device).expect("Failed to read device image");
        let image: Value = serde_json::from_str(&text).expect("Device image is not JSON");
        image["params"]
            .as_array()?
            .iter()
            .find(|p| p["name"] == name)
            .map(|p| p["value"].clone())
    }

    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("version.state")
    }

    #[must_use]
    pub fn snapshot_db_path(&self) -> PathBuf {
        self.dir.path().join("snapshots.db")
    }

    /// Pretend `version` was applied by a previous run.
    pub fn write_state(&self, version: &str) -> PathBuf {
        self.write("version.state", &format!("{version}\n"))
    }

    /// Raw contents of the state file, if any.
    #[must_use]
    pub fn read_state(&self) -> Option<String> {
        std::fs::read_to_string(self.state_path()).ok()
    }
}

/// Render parameter file text.
#[must_use]
pub fn param_file_text(version: &str, rows: &[Row<'_>]) -> String {
    let mut text = String::from("# Onboard parameters for Vehicle 1\n#\n");
    let _ = writeln!(text, "# Version {version}");
    text.push_str("#\n# Vehicle-Id Component-Id Name Value Type\n");
    for (vehicle, component, name, value, tag) in rows {
        let _ = writeln!(text, "{vehicle}\t{component}\t{name}\t{value}\t{tag}");
    }
    text
}

/// JSON for a live `REAL32` parameter.
#[must_use]
pub fn real32(name: &str, value: f64) -> Value {
    json!({ "name": name, "type": "real32", "value": value })
}

/// JSON for a live `INT32` parameter.
#[must_use]
pub fn int32(name: &str, value: i64) -> Value {
    json!({ "name": name, "type": "int32", "value": value })
}
