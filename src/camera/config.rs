//! Capture configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture configuration shared by every device in a preview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Pixel format requested from the driver
    pub format: PixelFormat,

    /// Number of V4L2 buffers to keep mapped
    pub buffer_count: u32,

    /// Frame-rate cap applied by the acquisition loop
    pub max_fps: u32,

    /// Size frames are scaled to before they enter the queue; `None` keeps native size
    pub preview: Option<(u32, u32)>,

    /// Capacity of the shared frame queue
    pub queue_capacity: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Mjpeg,
            // A single mapped buffer is not enough for streaming I/O
            buffer_count: 2,
            max_fps: 30,
            preview: Some((640, 480)),
            queue_capacity: 2,
        }
    }
}

impl CameraConfig {
    /// Preset for 1080p HD webcams, displayed at native size
    pub fn hd_webcam() -> Self {
        Self {
            width: 1920,
            height: 1080,
            format: PixelFormat::Mjpeg,
            preview: None,
            ..Default::default()
        }
    }

    /// Minimum spacing between two reads on the same device
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.max_fps.max(1)))
    }
}

/// Pixel format for camera capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Motion JPEG (compressed, recommended for high resolution)
    Mjpeg,
    /// YUYV 4:2:2 (uncompressed, better compatibility)
    Yuyv,
    /// RGB24 (uncompressed, high bandwidth)
    Rgb24,
}

impl PixelFormat {
    /// Convert to V4L2 FourCC code
    pub fn to_fourcc(self) -> v4l::FourCC {
        match self {
            PixelFormat::Mjpeg => v4l::FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => v4l::FourCC::new(b"RGB3"),
        }
    }

    /// Map a FourCC negotiated by the driver back to a supported format
    pub fn from_fourcc(fourcc: v4l::FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }

    /// Parse from a user-provided string (case-insensitive)
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" => Some(PixelFormat::Mjpeg),
            "yuyv" => Some(PixelFormat::Yuyv),
            "rgb" | "rgb24" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}
