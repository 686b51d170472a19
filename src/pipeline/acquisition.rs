//! Per-device acquisition threads

use super::queue::{FrameQueue, PushOutcome, TaggedFrame};
use crate::camera::DeviceId;
use crate::error::{Error, Result};
use image::DynamicImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pause between loop iterations so the device mutex is never held continuously
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Something frames can be read from
pub trait FrameSource: Send {
    /// Read and decode the next frame
    fn read_frame(&mut self) -> Result<DynamicImage>;

    /// Release the underlying device; further reads fail
    fn release(&mut self);
}

/// Lifecycle of a device's capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionState {
    /// No source attached
    Idle,
    /// Source attached, thread not started
    Opened,
    /// Thread reading frames
    Running,
    /// Source released
    Stopped,
}

/// Capture state guarded by the handle's mutex
pub struct CaptureState {
    /// Open frame source
    pub source: Option<Box<dyn FrameSource>>,
    /// When the last read was attempted
    pub last_frame: Option<Instant>,
    /// Lifecycle state
    pub state: AcquisitionState,
}

/// One camera taking part in a preview session
pub struct DeviceHandle {
    /// `N` of `/dev/videoN`
    pub index: u32,
    /// `VID-PID` identifier frames are tagged with
    pub id: DeviceId,
    capture: Mutex<CaptureState>,
    exit: AtomicBool,
}

impl DeviceHandle {
    /// Handle with no source attached
    pub fn new(index: u32, id: DeviceId) -> Self {
        Self {
            index,
            id,
            capture: Mutex::new(CaptureState {
                source: None,
                last_frame: None,
                state: AcquisitionState::Idle,
            }),
            exit: AtomicBool::new(false),
        }
    }

    /// Handle with `source` already open
    pub fn with_source(index: u32, id: DeviceId, source: Box<dyn FrameSource>) -> Self {
        let handle = Self::new(index, id);
        handle.attach(source);
        handle
    }

    /// Attach an open source
    pub fn attach(&self, source: Box<dyn FrameSource>) {
        let mut capture = self.lock();
        capture.source = Some(source);
        capture.last_frame = None;
        capture.state = AcquisitionState::Opened;
    }

    /// Exclusive access to the capture state
    pub fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state
    pub fn state(&self) -> AcquisitionState {
        self.lock().state
    }

    /// Ask the acquisition thread to stop
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested
    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

/// Counters returned by an acquisition thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Device identifier
    pub device: String,
    /// Frames read and queued
    pub captured: u64,
    /// Frames read but discarded because the queue was full
    pub dropped: u64,
    /// Failed reads
    pub read_errors: u64,
}

/// Run the acquisition loop for `handle` on the current thread until exit is requested
pub fn run(handle: &DeviceHandle, queue: &FrameQueue, interval: Duration) -> AcquisitionStats {
    let mut stats = AcquisitionStats {
        device: handle.id.to_string(),
        ..AcquisitionStats::default()
    };

    {
        let mut capture = handle.lock();
        if capture.source.is_some() {
            capture.state = AcquisitionState::Running;
        }
    }

    while !handle.exit_requested() {
        {
            let mut guard = handle.lock();
            let capture = &mut *guard;
            let due = capture
                .last_frame
                .is_none_or(|last| last.elapsed() >= interval);

            if due {
                if let Some(source) = capture.source.as_mut() {
                    // Failed reads are paced like successful ones.
                    capture.last_frame = Some(Instant::now());
                    match source.read_frame() {
                        Ok(image) => match queue.push(TaggedFrame::new(handle.id.clone(), image)) {
                            PushOutcome::Queued => stats.captured += 1,
                            PushOutcome::Dropped => stats.dropped += 1,
                        },
                        Err(err) => {
                            stats.read_errors += 1;
                            tracing::debug!(device = %handle.id, "frame read failed: {err}");
                        }
                    }
                }
            }
        }
        thread::sleep(IDLE_SLEEP);
    }

    let mut capture = handle.lock();
    if let Some(mut source) = capture.source.take() {
        source.release();
    }
    capture.state = AcquisitionState::Stopped;

    tracing::debug!(
        device = %handle.id,
        captured = stats.captured,
        dropped = stats.dropped,
        read_errors = stats.read_errors,
        "acquisition stopped"
    );
    stats
}

/// Start the acquisition loop for `handle` on a named thread
pub fn spawn(
    handle: Arc<DeviceHandle>,
    queue: FrameQueue,
    interval: Duration,
) -> Result<JoinHandle<AcquisitionStats>> {
    thread::Builder::new()
        .name(format!("acquire-video{}", handle.index))
        .spawn(move || run(&handle, &queue, interval))
        .map_err(|e| Error::Other(format!("failed to spawn acquisition thread: {e}")))
}
