//! UVC video node discovery

use super::{DeviceId, DiscoveredCamera};
use crate::config::CameraOptions;
use crate::error::{Error, Result};
use crate::tools::CommandRunner;
use crate::tools::udev::Udevadm;
use crate::tools::v4l2ctl::V4l2Ctl;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where and how to look for cameras
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Directory holding `video<N>` nodes
    pub dev_dir: PathBuf,
    /// Driver name a node must report
    pub driver: String,
    /// Open each node through v4l and require video capture support
    pub check_open: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from(&CameraOptions::default())
    }
}

impl From<&CameraOptions> for DiscoveryOptions {
    fn from(options: &CameraOptions) -> Self {
        Self {
            dev_dir: options.dev_dir.clone(),
            driver: options.driver.clone(),
            check_open: true,
        }
    }
}

/// `N` for a file named `video<N>`
pub fn video_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("video")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `video<N>` nodes under `dir`, sorted by `N`. A missing directory has none.
pub fn video_nodes(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "device directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let index = video_index(entry.file_name().to_str()?)?;
            Some((index, entry.path()))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    Ok(nodes)
}

/// Confirm the node opens and advertises video capture
fn probe_capture(path: &str) -> Result<()> {
    let device = v4l::Device::with_path(path)
        .map_err(|e| Error::Camera(format!("Failed to open {path}: {e}")))?;
    let caps = device
        .query_caps()
        .map_err(|e| Error::Camera(format!("Failed to query {path}: {e}")))?;
    if !caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
    {
        return Err(Error::Camera(format!("{path} does not support video capture")));
    }
    Ok(())
}

/// Finds UVC cameras and resolves their identifiers
#[derive(Clone)]
pub struct Discovery {
    v4l2: V4l2Ctl,
    udev: Udevadm,
    options: DiscoveryOptions,
}

impl Discovery {
    /// Discovery using the given utilities
    pub fn new(v4l2: V4l2Ctl, udev: Udevadm, options: DiscoveryOptions) -> Self {
        Self {
            v4l2,
            udev,
            options,
        }
    }

    /// Discovery running `v4l2_ctl` and `udevadm` through `runner`
    pub fn with_runner(
        runner: Arc<dyn CommandRunner>,
        v4l2_ctl: &str,
        udevadm: &str,
        options: DiscoveryOptions,
    ) -> Self {
        Self::new(
            V4l2Ctl::new(runner.clone(), v4l2_ctl),
            Udevadm::new(runner, udevadm),
            options,
        )
    }

    /// Every usable camera, in node order.
    ///
    /// Nodes that fail any check are logged and left out.
    pub async fn discover(&self) -> Result<Vec<DiscoveredCamera>> {
        let nodes = video_nodes(&self.options.dev_dir)?;
        let mut cameras = Vec::with_capacity(nodes.len());

        for (index, path) in nodes {
            let path = path.to_string_lossy().into_owned();
            match self.inspect(index, &path).await {
                Ok(Some(camera)) => {
                    tracing::info!(device = %path, id = %camera.id, "camera found");
                    cameras.push(camera);
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(device = %path, "skipping node: {err}"),
            }
        }

        tracing::debug!(count = cameras.len(), "discovery finished");
        Ok(cameras)
    }

    async fn inspect(&self, index: u32, path: &str) -> Result<Option<DiscoveredCamera>> {
        let info = self.v4l2.driver_info(path).await?;
        if info.driver.as_deref() != Some(self.options.driver.as_str()) {
            tracing::debug!(
                device = path,
                driver = ?info.driver,
                "not a {} node",
                self.options.driver
            );
            return Ok(None);
        }

        if self.options.check_open {
            probe_capture(path)?;
        }

        let id: DeviceId = self.udev.device_id(path).await;
        Ok(Some(DiscoveredCamera {
            index,
            path: path.to_string(),
            id,
            card: info.card,
        }))
    }
}
