//! Display consumer draining the frame queue

use super::queue::{FrameQueue, TaggedFrame};
use crate::camera::DeviceId;
use crate::error::{Error, Result};
use image::ImageFormat;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long the display loop waits for a frame before polling for quit
pub const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Destination for displayed frames
pub trait FrameSink: Send {
    /// Prepare a surface for a device seen for the first time
    fn open_surface(&mut self, device: &DeviceId) -> Result<()>;

    /// Show one frame on its device's surface
    fn render(&mut self, frame: &TaggedFrame) -> Result<()>;

    /// Whether the sink asks the session to end
    fn quit_requested(&mut self) -> bool {
        false
    }

    /// Tear down all surfaces
    fn close(&mut self) {}
}

/// Why the display loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Shared stop flag was set (Ctrl-C)
    Interrupted,
    /// The sink requested quit
    Sink,
    /// Configured duration elapsed
    Elapsed,
}

/// Frames shown by the display loop
#[derive(Debug, Clone, Serialize)]
pub struct DisplayStats {
    /// Frames rendered per device identifier
    pub rendered: BTreeMap<String, u64>,
    /// Frames the sink failed to render
    pub render_errors: u64,
    /// Why the loop ended
    pub reason: StopReason,
}

/// Drain `queue` into `sink` until the stop flag, sink or deadline ends the session
pub fn run(
    queue: &FrameQueue,
    sink: &mut dyn FrameSink,
    stop: &AtomicBool,
    deadline: Option<Instant>,
) -> DisplayStats {
    let mut rendered: BTreeMap<String, u64> = BTreeMap::new();
    let mut render_errors = 0;

    let reason = loop {
        if stop.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break StopReason::Elapsed;
        }

        if let Some(frame) = queue.pop_timeout(POP_TIMEOUT) {
            let key = frame.device.to_string();
            if !rendered.contains_key(&key) {
                if let Err(err) = sink.open_surface(&frame.device) {
                    tracing::warn!(device = %frame.device, "failed to open surface: {err}");
                }
                rendered.insert(key.clone(), 0);
            }
            match sink.render(&frame) {
                Ok(()) => *rendered.entry(key).or_default() += 1,
                Err(err) => {
                    render_errors += 1;
                    tracing::debug!(device = %frame.device, "render failed: {err}");
                }
            }
        }

        if sink.quit_requested() {
            break StopReason::Sink;
        }
    };

    sink.close();
    tracing::debug!(?reason, "display loop finished");
    DisplayStats {
        rendered,
        render_errors,
        reason,
    }
}

/// Spawn [`run`] on its own thread, taking ownership of the sink
pub fn spawn(
    queue: FrameQueue,
    mut sink: Box<dyn FrameSink>,
    stop: Arc<AtomicBool>,
    deadline: Option<Instant>,
) -> Result<std::thread::JoinHandle<DisplayStats>> {
    std::thread::Builder::new()
        .name("display".to_string())
        .spawn(move || run(&queue, sink.as_mut(), &stop, deadline))
        .map_err(|e| Error::Other(format!("failed to spawn display thread: {e}")))
}

/// Writes the latest frame of each device to `<dir>/<device-id>.jpg`
pub struct SnapshotSink {
    dir: PathBuf,
    min_interval: Duration,
    last_written: HashMap<DeviceId, Instant>,
}

impl SnapshotSink {
    /// Sink writing into `dir` at most once per `min_interval` per device
    pub fn new(dir: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            min_interval,
            last_written: HashMap::new(),
        }
    }

    /// Snapshot path for `device`
    pub fn path_for(&self, device: &DeviceId) -> PathBuf {
        self.dir.join(format!("{device}.jpg"))
    }

    fn write(&self, path: &Path, frame: &TaggedFrame) -> Result<()> {
        frame
            .image
            .to_rgb8()
            .save_with_format(path, ImageFormat::Jpeg)?;
        Ok(())
    }
}

impl FrameSink for SnapshotSink {
    fn open_surface(&mut self, device: &DeviceId) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        tracing::info!(
            device = %device,
            path = %self.path_for(device).display(),
            "writing snapshots"
        );
        Ok(())
    }

    fn render(&mut self, frame: &TaggedFrame) -> Result<()> {
        let due = self
            .last_written
            .get(&frame.device)
            .is_none_or(|last| last.elapsed() >= self.min_interval);
        if !due {
            return Ok(());
        }
        self.write(&self.path_for(&frame.device), frame)?;
        self.last_written
            .insert(frame.device.clone(), Instant::now());
        Ok(())
    }
}

/// Counts frames per device and logs a periodic summary
pub struct LogSink {
    every: Duration,
    window_start: Instant,
    counts: BTreeMap<DeviceId, u64>,
}

impl LogSink {
    /// Sink logging a summary every `every`
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            window_start: Instant::now(),
            counts: BTreeMap::new(),
        }
    }

    fn flush(&mut self) {
        let secs = self.window_start.elapsed().as_secs_f64().max(f64::EPSILON);
        for (device, count) in &mut self.counts {
            tracing::info!(
                device = %device,
                frames = *count,
                fps = %format!("{:.1}", *count as f64 / secs),
                "preview"
            );
            *count = 0;
        }
        self.window_start = Instant::now();
    }
}

impl FrameSink for LogSink {
    fn open_surface(&mut self, device: &DeviceId) -> Result<()> {
        tracing::info!(device = %device, "first frame received");
        self.counts.insert(device.clone(), 0);
        Ok(())
    }

    fn render(&mut self, frame: &TaggedFrame) -> Result<()> {
        *self.counts.entry(frame.device.clone()).or_default() += 1;
        if self.window_start.elapsed() >= self.every {
            self.flush();
        }
        Ok(())
    }

    fn close(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    #[derive(Default)]
    struct QuitAfter {
        limit: usize,
        surfaces: Vec<DeviceId>,
        frames: usize,
    }

    impl FrameSink for QuitAfter {
        fn open_surface(&mut self, device: &DeviceId) -> Result<()> {
            self.surfaces.push(device.clone());
            Ok(())
        }

        fn render(&mut self, _frame: &TaggedFrame) -> Result<()> {
            self.frames += 1;
            Ok(())
        }

        fn quit_requested(&mut self) -> bool {
            self.frames >= self.limit
        }
    }

    fn frame(vid: &str) -> TaggedFrame {
        TaggedFrame::new(DeviceId::from_vid_pid(vid, "0001"), DynamicImage::new_rgb8(8, 8))
    }

    #[test]
    fn test_surfaces_created_once_per_device() {
        let queue = FrameQueue::new(4);
        queue.push(frame("f225"));
        queue.push(frame("0bda"));
        queue.push(frame("f225"));

        let mut sink = QuitAfter {
            limit: 3,
            ..QuitAfter::default()
        };
        let stats = run(&queue, &mut sink, &AtomicBool::new(false), None);

        assert_eq!(stats.reason, StopReason::Sink);
        assert_eq!(sink.surfaces.len(), 2);
        assert_eq!(stats.rendered["F225-0001"], 2);
        assert_eq!(stats.rendered["0BDA-0001"], 1);
    }

    #[test]
    fn test_stop_flag_and_deadline() {
        let queue = FrameQueue::new(1);
        let mut sink = LogSink::new(Duration::from_secs(60));
        let stats = run(&queue, &mut sink, &AtomicBool::new(true), None);
        assert_eq!(stats.reason, StopReason::Interrupted);

        let deadline = Instant::now() + Duration::from_millis(150);
        let stats = run(&queue, &mut sink, &AtomicBool::new(false), Some(deadline));
        assert_eq!(stats.reason, StopReason::Elapsed);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_snapshot_sink_writes_jpeg_per_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(dir.path().join("shots"), Duration::ZERO);
        let frame = frame("f225");

        sink.open_surface(&frame.device).unwrap();
        sink.render(&frame).unwrap();

        let path = dir.path().join("shots/F225-0001.jpg");
        let written = image::open(&path).expect("valid jpeg");
        assert_eq!((written.width(), written.height()), (8, 8));
    }
}
