//! uvcprobe - debugging toolkit for UVC cameras on Linux
//!
//! This library backs the `uvcprobe` binary: discovery of UVC video nodes,
//! inspection and validated writes of V4L2 controls, per-device parameter
//! persistence, USB inventory, and a multi-camera preview pipeline.
//!
//! # Features
//!
//! - **Discovery**: `/dev/video*` enumeration filtered by driver, with `VID-PID` identifiers from udev
//! - **Controls**: a built-in registry of UVC controls, validated before any write
//! - **Persistence**: saved values keyed by device identifier in a flat JSON file
//! - **Preview**: one acquisition thread per camera feeding a bounded, lossy frame queue
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uvcprobe::camera::{Discovery, DiscoveryOptions};
//! use uvcprobe::tools::SystemRunner;
//!
//! #[tokio::main]
//! async fn main() -> uvcprobe::Result<()> {
//!     let runner = Arc::new(SystemRunner::default());
//!     let discovery =
//!         Discovery::with_runner(runner, "v4l2-ctl", "udevadm", DiscoveryOptions::default());
//!
//!     for camera in discovery.discover().await? {
//!         println!("{} {}", camera.path, camera.id);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]

pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod store;
pub mod tools;

// Re-exports for convenience
pub use error::{Error, Result};

pub use camera::{CameraConfig, DeviceId, DiscoveredCamera, Discovery, PixelFormat};
pub use config::{
    CameraOptions, ControlBackend, LogRotation, LoggingOptions, SerialOptions, StoreOptions,
    ToolOptions, UvcConfig,
};
pub use params::{ControlId, ParamDescriptor, ParamKind, ParamRegistry, ParamSetter, ValueMode};
pub use pipeline::{FrameQueue, Preview, PreviewOptions, TaggedFrame};
pub use store::ParamStore;
