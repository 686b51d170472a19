//! `udevadm info -q property` lookups

use super::{CommandRunner, split_key_value};
use crate::camera::DeviceId;
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// USB identity properties udev records for a video node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UdevProperties {
    /// `ID_VENDOR_ID`, uppercased
    pub vendor_id: Option<String>,
    /// `ID_MODEL_ID`, uppercased
    pub model_id: Option<String>,
    /// `ID_SERIAL_SHORT`
    pub serial_short: Option<String>,
    /// `ID_VENDOR`
    pub vendor: Option<String>,
    /// `ID_MODEL`
    pub model: Option<String>,
}

impl UdevProperties {
    /// `VID-PID`, or [`DeviceId::unknown`] when either half is missing
    pub fn device_id(&self) -> DeviceId {
        match (&self.vendor_id, &self.model_id) {
            (Some(vid), Some(pid)) => DeviceId::from_vid_pid(vid, pid),
            _ => DeviceId::unknown(),
        }
    }
}

/// Parse `KEY=value` lines, keeping the USB identity keys.
pub fn parse_properties(output: &str) -> UdevProperties {
    let mut props = UdevProperties::default();
    for line in output.lines() {
        let Some((key, value)) = split_key_value(line, '=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match key {
            "ID_VENDOR_ID" => props.vendor_id = Some(value.to_ascii_uppercase()),
            "ID_MODEL_ID" => props.model_id = Some(value.to_ascii_uppercase()),
            "ID_SERIAL_SHORT" => props.serial_short = Some(value.to_string()),
            "ID_VENDOR" => props.vendor = Some(value.to_string()),
            "ID_MODEL" => props.model = Some(value.to_string()),
            _ => {}
        }
    }
    props
}

/// Wrapper over `udevadm`
#[derive(Clone)]
pub struct Udevadm {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Udevadm {
    /// Wrap `program` (normally `udevadm`) using `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// `udevadm info -q property <device>`
    pub async fn properties(&self, device: &str) -> Result<UdevProperties> {
        let args = ["info", "-q", "property", device].map(String::from);
        let output = self.runner.run(&self.program, &args).await?;
        if !output.success() {
            return Err(Error::Tool {
                program: self.program.clone(),
                message: format!("no properties for {device}: {}", output.stderr.trim()),
            });
        }
        Ok(parse_properties(&output.stdout))
    }

    /// Identifier for `device`; any failure yields `UNKNOWN`
    pub async fn device_id(&self, device: &str) -> DeviceId {
        match self.properties(device).await {
            Ok(props) => props.device_id(),
            Err(err) => {
                tracing::warn!(device, "udev lookup failed: {err}");
                DeviceId::unknown()
            }
        }
    }
}
