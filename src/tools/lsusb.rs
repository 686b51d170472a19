//! `lsusb` listing and target-device classification

use super::CommandRunner;
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// Manufacturer names inferred from keywords in the product string
const MANUFACTURER_KEYWORDS: &[(&str, &[&str])] = &[
    ("VMware, Inc.", &["VMware"]),
    ("Linux Foundation", &["Linux"]),
    ("Generic", &["Generic"]),
];

/// One line of `lsusb`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDevice {
    /// Bus number
    pub bus: String,
    /// Device number on the bus
    pub device: String,
    /// Vendor id, uppercased
    pub vid: String,
    /// Product id, uppercased
    pub pid: String,
    /// Product description
    pub name: String,
    /// Manufacturer inferred from the description, `N/A` when unknown
    pub manufacturer: String,
    /// Serial number, assigned to target devices only
    pub serial: Option<String>,
}

impl UsbDevice {
    /// `VID-PID`
    pub fn vid_pid(&self) -> String {
        format!("{}-{}", self.vid, self.pid)
    }
}

/// `lsusb` output split into target devices and everything else
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsbInventory {
    /// Devices whose name contains the target keyword
    pub targets: Vec<UsbDevice>,
    /// Remaining devices
    pub others: Vec<UsbDevice>,
    /// `VID-PID` combinations from the watch list that were seen
    pub flagged: Vec<String>,
}

impl UsbInventory {
    /// Classify devices by `target_name` (case-insensitive) and flag `target_ids`
    pub fn classify(devices: Vec<UsbDevice>, target_name: &str, target_ids: &[String]) -> Self {
        let keyword = target_name.to_lowercase();
        let mut inventory = Self::default();

        for mut device in devices {
            let vid_pid = device.vid_pid();
            if target_ids.iter().any(|id| id.eq_ignore_ascii_case(&vid_pid))
                && !inventory.flagged.contains(&vid_pid)
            {
                inventory.flagged.push(vid_pid);
            }

            if !keyword.is_empty() && device.name.to_lowercase().contains(&keyword) {
                device.manufacturer = target_name.to_string();
                inventory.targets.push(device);
            } else {
                inventory.others.push(device);
            }
        }

        inventory
    }

    /// Pair serial numbers with target devices in enumeration order
    pub fn assign_serials(&mut self, serials: &[String]) {
        for (device, serial) in self.targets.iter_mut().zip(serials) {
            device.serial = Some(serial.clone());
        }
    }

    /// True when `lsusb` reported nothing
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.others.is_empty()
    }
}

fn infer_manufacturer(name: &str) -> String {
    MANUFACTURER_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k)))
        .map(|(manufacturer, _)| manufacturer.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Parse `lsusb` output; lines with fewer than six fields are skipped.
pub fn parse_lsusb(output: &str) -> Vec<UsbDevice> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let (vid, pid) = parts[5].split_once(':')?;
            let name = parts[6..].join(" ");
            Some(UsbDevice {
                bus: parts[1].to_string(),
                device: parts[3].trim_end_matches(':').to_string(),
                vid: vid.to_ascii_uppercase(),
                pid: pid.to_ascii_uppercase(),
                manufacturer: infer_manufacturer(&name),
                name,
                serial: None,
            })
        })
        .collect()
}

/// Run `lsusb` and parse its output
pub async fn list(runner: &Arc<dyn CommandRunner>, program: &str) -> Result<Vec<UsbDevice>> {
    let output = runner.run(program, &[]).await?;
    if !output.success() {
        return Err(Error::Tool {
            program: program.to_string(),
            message: output.stderr.trim().to_string(),
        });
    }
    Ok(parse_lsusb(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSUSB: &str = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Bus 001 Device 004: ID f225:0001 ViTai F225 Camera
Bus 001 Device 005: ID f225:0001 ViTai F225 Camera
Bus 001 Device 003: ID 0e0f:0002 VMware, Inc. Virtual USB Hub
Bus 001 Device 002: ID 05e3:0610
garbage line
";

    #[test]
    fn test_parse_lsusb_fields() {
        let devices = parse_lsusb(LSUSB);
        assert_eq!(devices.len(), 5);
        assert_eq!(devices[0].manufacturer, "Linux Foundation");
        assert_eq!(devices[1].vid_pid(), "F225-0001");
        assert_eq!(devices[1].bus, "001");
        assert_eq!(devices[1].device, "004");
        assert_eq!(devices[3].manufacturer, "VMware, Inc.");
        assert_eq!(devices[4].name, "");
    }

    #[test]
    fn test_classify_and_assign_serials() {
        let ids = vec!["F225-0001".to_string()];
        let mut inventory = UsbInventory::classify(parse_lsusb(LSUSB), "vitai", &ids);
        assert_eq!(inventory.targets.len(), 2);
        assert_eq!(inventory.others.len(), 3);
        assert_eq!(inventory.flagged, vec!["F225-0001"]);
        assert_eq!(inventory.targets[0].manufacturer, "vitai");

        inventory.assign_serials(&["GF225A0001".to_string()]);
        assert_eq!(inventory.targets[0].serial.as_deref(), Some("GF225A0001"));
        assert_eq!(inventory.targets[1].serial, None);
    }
}
