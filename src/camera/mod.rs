//! V4L2 camera access for Linux
//!
//! Discovery of UVC video nodes and low-latency frame capture through the
//! Video4Linux2 mmap streaming API.

mod config;
mod device;
pub mod discovery;

pub use config::{CameraConfig, PixelFormat};
pub use device::CaptureDevice;
pub use discovery::{Discovery, DiscoveryOptions};

use serde::{Deserialize, Serialize};
use std::fmt;

const UNKNOWN: &str = "UNKNOWN";

/// `VID-PID` identifier of a camera, or `UNKNOWN`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Identifier built from udev vendor and model ids
    pub fn from_vid_pid(vid: &str, pid: &str) -> Self {
        Self(format!(
            "{}-{}",
            vid.trim().to_ascii_uppercase(),
            pid.trim().to_ascii_uppercase()
        ))
    }

    /// Placeholder for devices whose identity could not be determined
    pub fn unknown() -> Self {
        Self(UNKNOWN.to_string())
    }

    /// Whether this is the `UNKNOWN` placeholder
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN
    }

    /// Identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A UVC capture node found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredCamera {
    /// `N` of `/dev/videoN`
    pub index: u32,
    /// Device node path
    pub path: String,
    /// `VID-PID` identifier
    pub id: DeviceId,
    /// Card name reported by the driver
    pub card: Option<String>,
}
