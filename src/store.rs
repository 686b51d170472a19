//! Saved control values, keyed by device identifier
//!
//! The file is a flat JSON object:
//!
//! ```json
//! { "F225-0001": { "0x00980900": -39, "0x00980913": 64 } }
//! ```

use crate::camera::DeviceId;
use crate::error::{Error, Result};
use crate::params::ControlId;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

type StoreFile = BTreeMap<String, BTreeMap<ControlId, i64>>;

/// JSON parameter file shared by all devices
#[derive(Debug, Clone)]
pub struct ParamStore {
    path: PathBuf,
}

impl ParamStore {
    /// Store backed by `path`; the file need not exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<StoreFile> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreFile::new()),
            Err(e) => {
                return Err(Error::Store(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if contents.trim().is_empty() {
            return Ok(StoreFile::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| Error::Store(format!("Failed to parse {}: {e}", self.path.display())))
    }

    /// Values saved for `device`; empty when the file or entry is missing
    pub fn load(&self, device: &DeviceId) -> Result<BTreeMap<ControlId, i64>> {
        Ok(self
            .read_all()?
            .remove(device.as_str())
            .unwrap_or_default())
    }

    /// Every device entry in the file
    pub fn load_all(&self) -> Result<BTreeMap<String, BTreeMap<ControlId, i64>>> {
        self.read_all()
    }

    /// Replace the entry for `device`, keeping every other device's values
    pub fn save(&self, device: &DeviceId, values: &BTreeMap<ControlId, i64>) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(device.as_str().to_string(), values.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Store(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(&all)?;
        fs::write(&self.path, json + "\n")
            .map_err(|e| Error::Store(format!("Failed to write {}: {e}", self.path.display())))?;

        tracing::info!(
            device = %device,
            controls = values.len(),
            path = %self.path.display(),
            "parameters saved"
        );
        Ok(())
    }
}
