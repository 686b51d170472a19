//! Multi-camera preview pipeline
//!
//! One acquisition thread per camera pushes decoded frames into a shared
//! bounded [`FrameQueue`]; a single display thread drains it into a
//! [`FrameSink`]. Producers never block: when the consumer falls behind,
//! new frames are dropped and counted.

pub mod acquisition;
pub mod display;
pub mod queue;

pub use acquisition::{AcquisitionState, AcquisitionStats, DeviceHandle, FrameSource};
pub use display::{DisplayStats, FrameSink, LogSink, SnapshotSink, StopReason};
pub use queue::{FrameQueue, PushOutcome, TaggedFrame};

use crate::camera::{CameraConfig, CaptureDevice, DiscoveredCamera, Discovery};
use crate::error::{Error, Result};
use crate::params::ParamSetter;
use crate::store::ParamStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Opens a frame source for a discovered camera
pub type SourceOpener =
    Arc<dyn Fn(&DiscoveredCamera, &CameraConfig) -> Result<Box<dyn FrameSource>> + Send + Sync>;

/// Display consumer to run
#[derive(Debug, Clone)]
pub enum SinkKind {
    /// Periodic per-device frame-rate log lines
    Log {
        /// Summary period
        every: Duration,
    },
    /// Latest frame per device written as JPEG
    Snapshot {
        /// Output directory
        dir: PathBuf,
        /// Minimum spacing between writes per device
        interval: Duration,
    },
}

impl SinkKind {
    fn build(&self) -> Box<dyn FrameSink> {
        match self {
            SinkKind::Log { every } => Box::new(LogSink::new(*every)),
            SinkKind::Snapshot { dir, interval } => Box::new(SnapshotSink::new(dir, *interval)),
        }
    }
}

impl Default for SinkKind {
    fn default() -> Self {
        SinkKind::Log {
            every: Duration::from_secs(5),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    /// Display consumer
    pub sink: SinkKind,
    /// End the session after this long
    pub duration: Option<Duration>,
    /// Apply saved parameters to each camera before streaming
    pub apply_stored: bool,
}

/// Outcome of a preview session
#[derive(Debug, Clone, Serialize)]
pub struct PreviewSummary {
    /// Per-device acquisition counters
    pub devices: Vec<AcquisitionStats>,
    /// Display counters
    pub display: DisplayStats,
    /// Total frames dropped at the queue
    pub queue_dropped: u64,
}

fn open_capture(found: &DiscoveredCamera, config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let capture = CaptureDevice::open(&found.path, config)?;
    let (width, height) = capture.size();
    if (width, height) != (config.width, config.height) {
        tracing::info!(
            device = capture.path(),
            requested = %format!("{}x{}", config.width, config.height),
            negotiated = %format!("{width}x{height}"),
            "driver adjusted capture size"
        );
    }
    Ok(Box::new(capture))
}

/// Discover, configure, stream and display every camera
pub struct Preview {
    discovery: Discovery,
    setter: ParamSetter,
    store: ParamStore,
    camera: CameraConfig,
    options: PreviewOptions,
    opener: SourceOpener,
}

impl Preview {
    /// Session opening real V4L2 capture devices
    pub fn new(
        discovery: Discovery,
        setter: ParamSetter,
        store: ParamStore,
        camera: CameraConfig,
        options: PreviewOptions,
    ) -> Self {
        Self {
            discovery,
            setter,
            store,
            camera,
            options,
            opener: Arc::new(open_capture),
        }
    }

    /// Replace how frame sources are opened
    pub fn with_opener(mut self, opener: SourceOpener) -> Self {
        self.opener = opener;
        self
    }

    async fn apply_stored(&self, camera: &DiscoveredCamera) {
        let values = match self.store.load(&camera.id) {
            Ok(values) if values.is_empty() => {
                tracing::debug!(device = %camera.path, id = %camera.id, "no stored parameters");
                return;
            }
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(device = %camera.path, "failed to load stored parameters: {err}");
                return;
            }
        };
        if let Err(err) = self.setter.apply_values(&camera.path, &values).await {
            tracing::warn!(device = %camera.path, "failed to apply stored parameters: {err}");
        }
    }

    /// Run until `stop` is set, the sink quits or the duration elapses
    pub async fn run(&self, stop: Arc<AtomicBool>) -> Result<PreviewSummary> {
        let cameras = self.discovery.discover().await?;
        if cameras.is_empty() {
            return Err(Error::CameraNotFound("no UVC cameras found".to_string()));
        }

        let mut handles = Vec::with_capacity(cameras.len());
        for camera in &cameras {
            let source = match (self.opener)(camera, &self.camera) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(device = %camera.path, "failed to open camera: {err}");
                    continue;
                }
            };
            if self.options.apply_stored {
                self.apply_stored(camera).await;
            }
            handles.push(Arc::new(DeviceHandle::with_source(
                camera.index,
                camera.id.clone(),
                source,
            )));
        }
        if handles.is_empty() {
            return Err(Error::CameraNotFound(
                "no camera could be opened".to_string(),
            ));
        }

        let queue = FrameQueue::new(self.camera.queue_capacity);
        let interval = self.camera.frame_interval();
        let mut producers = Vec::with_capacity(handles.len());
        for index in 0..handles.len() {
            match acquisition::spawn(handles[index].clone(), queue.clone(), interval) {
                Ok(producer) => producers.push(producer),
                Err(err) => {
                    stop_producers(handles, producers).await;
                    return Err(err);
                }
            }
        }
        tracing::info!(cameras = handles.len(), "preview started");

        let deadline = self.options.duration.map(|d| Instant::now() + d);
        let consumer =
            match display::spawn(queue.clone(), self.options.sink.build(), stop, deadline) {
                Ok(consumer) => consumer,
                Err(err) => {
                    stop_producers(handles, producers).await;
                    return Err(err);
                }
            };

        let display = tokio::task::spawn_blocking(move || consumer.join()).await;
        let devices = stop_producers(handles, producers).await;
        let display = match display {
            Ok(Ok(stats)) => stats,
            Ok(Err(_)) => return Err(Error::Other("display thread panicked".to_string())),
            Err(e) => return Err(Error::Other(format!("preview join failed: {e}"))),
        };

        let summary = PreviewSummary {
            devices,
            display,
            queue_dropped: queue.dropped(),
        };
        tracing::info!(
            reason = ?summary.display.reason,
            dropped = summary.queue_dropped,
            "preview finished"
        );
        Ok(summary)
    }
}

/// Ask every acquisition thread to exit and wait for them.
///
/// `producers[i]` must belong to `handles[i]`; handles past the end of
/// `producers` were never started.
async fn stop_producers(
    handles: Vec<Arc<DeviceHandle>>,
    producers: Vec<JoinHandle<AcquisitionStats>>,
) -> Vec<AcquisitionStats> {
    for handle in &handles {
        handle.request_exit();
    }
    let joined = tokio::task::spawn_blocking(move || {
        handles
            .iter()
            .zip(producers)
            .filter_map(|(handle, producer)| match producer.join() {
                Ok(stats) => Some(stats),
                Err(_) => {
                    tracing::warn!(device = %handle.id, "acquisition thread panicked");
                    None
                }
            })
            .collect()
    })
    .await;
    joined.unwrap_or_else(|e| {
        tracing::warn!("failed to join acquisition threads: {e}");
        Vec::new()
    })
}

/// Set `stop` when Ctrl-C is received
pub fn stop_on_ctrl_c(stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, stopping");
                stop.store(true, Ordering::SeqCst);
            }
            Err(err) => tracing::warn!("failed to listen for Ctrl-C: {err}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{DeviceId, DiscoveryOptions};
    use crate::params::{CliWriter, ParamRegistry};
    use crate::tools::CommandOutput;
    use crate::tools::testing::ScriptedRunner;
    use crate::tools::v4l2ctl::V4l2Ctl;
    use crate::tools::v4l2ctl::fixtures::ALL_OUTPUT;
    use image::DynamicImage;

    struct Blank;

    impl FrameSource for Blank {
        fn read_frame(&mut self) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(2, 2))
        }

        fn release(&mut self) {}
    }

    struct Broken;

    impl FrameSource for Broken {
        fn read_frame(&mut self) -> Result<DynamicImage> {
            panic!("driver fault");
        }

        fn release(&mut self) {}
    }

    #[tokio::test]
    async fn test_stop_producers_joins_every_thread() {
        let healthy = Arc::new(DeviceHandle::with_source(
            0,
            DeviceId::from_vid_pid("f225", "0001"),
            Box::new(Blank),
        ));
        let broken = Arc::new(DeviceHandle::with_source(
            2,
            DeviceId::from_vid_pid("0bda", "0001"),
            Box::new(Broken),
        ));
        let queue = FrameQueue::new(2);
        let handles = vec![healthy.clone(), broken.clone()];
        let producers = handles
            .iter()
            .map(|h| acquisition::spawn(h.clone(), queue.clone(), Duration::ZERO).unwrap())
            .collect();

        let stats = stop_producers(handles, producers).await;

        assert!(healthy.exit_requested() && broken.exit_requested());
        assert_eq!(healthy.state(), AcquisitionState::Stopped);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].device, "F225-0001");
    }

    #[tokio::test]
    async fn test_preview_streams_every_opened_camera() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["video0", "video2"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("v4l2-ctl -d", CommandOutput::ok(ALL_OUTPUT))
            .respond("udevadm info", CommandOutput::ok("ID_VENDOR_ID=f225\nID_MODEL_ID=0001\n"));

        let discovery = Discovery::with_runner(
            runner.clone(),
            "v4l2-ctl",
            "udevadm",
            DiscoveryOptions {
                dev_dir: dir.path().to_path_buf(),
                driver: "uvcvideo".to_string(),
                check_open: false,
            },
        );
        let v4l2 = V4l2Ctl::new(runner.clone(), "v4l2-ctl");
        let setter = ParamSetter::new(
            ParamRegistry::builtin(),
            Arc::new(CliWriter::new(v4l2.clone())),
            v4l2,
        );
        let options = PreviewOptions {
            duration: Some(Duration::from_millis(200)),
            ..PreviewOptions::default()
        };

        let preview = Preview::new(
            discovery,
            setter,
            ParamStore::new(dir.path().join("params.json")),
            CameraConfig::default(),
            options,
        )
        .with_opener(Arc::new(|found: &DiscoveredCamera, _: &CameraConfig| {
            if found.index == 2 {
                return Err(Error::Camera("busy".to_string()));
            }
            Ok(Box::new(Blank) as Box<dyn FrameSource>)
        }));

        let summary = preview
            .run(Arc::new(AtomicBool::new(false)))
            .await
            .expect("preview runs");
        assert_eq!(summary.display.reason, StopReason::Elapsed);
        assert_eq!(summary.devices.len(), 1);
        assert!(summary.devices[0].captured > 0);
        assert!(summary.display.rendered["F225-0001"] > 0);
    }
}
