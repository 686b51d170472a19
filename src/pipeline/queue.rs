//! Bounded frame queue shared by acquisition threads and the display loop

use crate::camera::DeviceId;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use image::DynamicImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default number of frames the queue holds
pub const DEFAULT_CAPACITY: usize = 2;

/// A frame tagged with the device it came from
#[derive(Debug, Clone)]
pub struct TaggedFrame {
    /// Source device identifier
    pub device: DeviceId,
    /// Decoded frame
    pub image: DynamicImage,
    /// When the frame was read
    pub captured_at: Instant,
}

impl TaggedFrame {
    /// Frame from `device` stamped now
    pub fn new(device: DeviceId, image: DynamicImage) -> Self {
        Self {
            device,
            image,
            captured_at: Instant::now(),
        }
    }
}

/// Result of a non-blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame enqueued
    Queued,
    /// Queue full, frame discarded
    Dropped,
}

/// Multi-producer, single-consumer bounded FIFO that never blocks producers
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<TaggedFrame>,
    rx: Receiver<TaggedFrame>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl FrameQueue {
    /// Queue holding at most `capacity` frames (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    /// Enqueue without waiting; a full queue drops the incoming frame
    pub fn push(&self, frame: TaggedFrame) -> PushOutcome {
        // Every clone owns a receiver, so the channel never disconnects.
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(frame) | TrySendError::Disconnected(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(device = %frame.device, "frame queue full, dropping frame");
                PushOutcome::Dropped
            }
        }
    }

    /// Wait up to `timeout` for the next frame
    pub fn pop_timeout(&self, timeout: Duration) -> Option<TaggedFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next frame if one is waiting
    pub fn try_pop(&self) -> Option<TaggedFrame> {
        self.rx.try_recv().ok()
    }

    /// Frames currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no frame is waiting
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
