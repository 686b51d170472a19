use image::DynamicImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use uvcprobe::DeviceId;
use uvcprobe::pipeline::{FrameQueue, PushOutcome, TaggedFrame};

#[test]
fn producers_never_block_and_queue_stays_bounded() {
    let queue = FrameQueue::new(2);
    let done = Arc::new(AtomicBool::new(false));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let watcher = {
        let (queue, done, max_seen) = (queue.clone(), done.clone(), max_seen.clone());
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                max_seen.fetch_max(queue.len(), Ordering::SeqCst);
                thread::yield_now();
            }
        })
    };

    let started = Instant::now();
    let producers: Vec<_> = ["F225", "0BDA", "046D"]
        .into_iter()
        .map(|vid| {
            let queue = queue.clone();
            thread::spawn(move || {
                let id = DeviceId::from_vid_pid(vid, "0001");
                let mut queued = 0u64;
                for _ in 0..500 {
                    let frame = TaggedFrame::new(id.clone(), DynamicImage::new_rgb8(2, 2));
                    if queue.push(frame) == PushOutcome::Queued {
                        queued += 1;
                    }
                }
                queued
            })
        })
        .collect();

    let queued: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();
    // Nothing consumes, so the producers only finish because pushes never wait.
    assert!(started.elapsed() < Duration::from_secs(5));

    done.store(true, Ordering::SeqCst);
    watcher.join().unwrap();

    assert_eq!(queued, 2);
    assert_eq!(queue.dropped(), 1500 - 2);
    assert!(max_seen.load(Ordering::SeqCst) <= 2);
    assert_eq!(queue.len(), 2);
}

#[test]
fn slow_consumer_sees_frames_in_order_per_device() {
    let queue = FrameQueue::new(2);
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let id = DeviceId::from_vid_pid("f225", "0001");
            for height in 1..=50u32 {
                queue.push(TaggedFrame::new(id.clone(), DynamicImage::new_luma8(1, height)));
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let mut last = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match queue.pop_timeout(Duration::from_millis(100)) {
            Some(frame) => {
                assert!(frame.image.height() > last);
                last = frame.image.height();
                thread::sleep(Duration::from_millis(3));
            }
            None if producer.is_finished() => break,
            None => {}
        }
    }
    producer.join().unwrap();
    assert!(last > 0);
    assert!(queue.len() <= queue.capacity());
}
