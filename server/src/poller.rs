use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cam_station_common::config::{CameraConfig, StreamConfig};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::camera;

/// A JPEG-encoded frame as published by the poller.
#[derive(Debug, Clone)]
pub struct JpegFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub captured_at_ms: i64,
    pub seq: u64,
}

/// Single-producer, multi-consumer slot holding the most recent frame.
///
/// The poller thread overwrites it continuously; HTTP handlers copy the
/// current value out under the lock. No queue, no backpressure: readers
/// that miss a frame simply see the next one.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<JpegFrame>>,
    seq: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, jpeg: Vec<u8>, width: u32, height: u32) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = JpegFrame {
            data: Bytes::from(jpeg),
            width,
            height,
            captured_at_ms: Utc::now().timestamp_millis(),
            seq,
        };
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    /// Drop the current frame so readers see the camera as offline.
    pub fn clear(&self) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Copy of the most recent frame, if any. Cheap: the JPEG payload
    /// is refcounted `Bytes`.
    pub fn latest(&self) -> Option<JpegFrame> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sequence number of the last published frame (0 = none yet).
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

struct PollerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    index: u32,
}

/// Owns the capture thread and allows switching devices at runtime.
pub struct CameraController {
    slot: Arc<FrameSlot>,
    camera_cfg: CameraConfig,
    stream_cfg: StreamConfig,
    active: Mutex<Option<PollerHandle>>,
}

impl CameraController {
    pub fn new(camera_cfg: CameraConfig, stream_cfg: StreamConfig) -> Self {
        Self {
            slot: Arc::new(FrameSlot::new()),
            camera_cfg,
            stream_cfg,
            active: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Index of the device the poller is (or is trying to be) attached to.
    pub fn device_index(&self) -> Option<u32> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|h| h.index)
    }

    /// Start polling the given device. Any previous poller is stopped
    /// and joined first, and the slot is cleared so a stale frame from
    /// the old device is never replayed as the new one.
    ///
    /// Blocks until the old thread exits; call from `spawn_blocking`
    /// in async context.
    pub fn start(&self, index: u32) -> std::io::Result<()> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = active.take() {
            info!(old_index = handle.index, new_index = index, "switching camera");
            handle.stop.store(true, Ordering::Relaxed);
            if handle.thread.join().is_err() {
                warn!("previous poller thread panicked");
            }
        }
        self.slot.clear();

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let slot = Arc::clone(&self.slot);
            let stop = Arc::clone(&stop);
            let camera_cfg = self.camera_cfg.clone();
            let stream_cfg = self.stream_cfg.clone();
            std::thread::Builder::new()
                .name(format!("camera-poller-{index}"))
                .spawn(move || run_poller(slot, stop, camera_cfg, stream_cfg, index))?
        };

        *active = Some(PollerHandle {
            stop,
            thread,
            index,
        });
        Ok(())
    }

    /// Stop the poller and wait for it. Used on shutdown.
    pub fn stop(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = active.take() {
            handle.stop.store(true, Ordering::Relaxed);
            let _ = handle.thread.join();
        }
        self.slot.clear();
    }
}

/// Bounded exponential backoff for device re-probing.
struct Backoff {
    current: Duration,
    base: Duration,
    max: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base,
            base,
            max,
        }
    }

    /// Delay to use now; the next one doubles, capped at `max`.
    fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Capture loop. Opens the device (with backend fallback), discards
/// warm-up frames, then reads/encodes/publishes paced to the stream
/// FPS. On any failure — open or read — the slot is cleared and the
/// device is re-probed after a bounded backoff; the backoff resets
/// only once a frame actually comes through. Best effort, never gives
/// up until stopped.
fn run_poller(
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    camera_cfg: CameraConfig,
    stream_cfg: StreamConfig,
    index: u32,
) {
    let frame_interval = Duration::from_secs_f64(1.0 / stream_cfg.fps.max(0.1));
    let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(10));

    while !stop.load(Ordering::Relaxed) {
        let mut cam = match camera::open_camera(
            index,
            camera_cfg.width,
            camera_cfg.height,
            camera_cfg.fps,
        ) {
            Ok(cam) => cam,
            Err(e) => {
                let delay = backoff.next();
                warn!(error = %e, index, "camera open failed, retrying in {:?}", delay);
                slot.clear();
                sleep_interruptible(&stop, delay);
                continue;
            }
        };

        for _ in 0..camera_cfg.warmup_frames {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let _ = cam.frame();
        }

        info!(index, "camera poller running");
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            match camera::read_jpeg(&mut cam, stream_cfg.quality) {
                Ok((jpeg, width, height)) => {
                    backoff.reset();
                    debug!(bytes = jpeg.len(), width, height, "frame published");
                    slot.publish(jpeg, width, height);
                }
                Err(e) => {
                    let delay = backoff.next();
                    warn!(error = %e, index, "frame read failed, reopening in {:?}", delay);
                    slot.clear();
                    sleep_interruptible(&stop, delay);
                    break;
                }
            }

            let elapsed = started.elapsed();
            if elapsed < frame_interval {
                sleep_interruptible(&stop, frame_interval - elapsed);
            }
        }
    }
}

/// Sleep in short slices so a stop request is honored promptly.
fn sleep_interruptible(stop: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(slice.min(deadline.saturating_duration_since(Instant::now())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        assert_eq!(slot.seq(), 0);
    }

    #[test]
    fn publish_overwrites_and_bumps_seq() {
        let slot = FrameSlot::new();
        slot.publish(vec![0xFF, 0xD8], 640, 480);
        slot.publish(vec![0xFF, 0xD8, 0xFF], 640, 480);

        let frame = slot.latest().unwrap();
        assert_eq!(frame.seq, 2);
        assert_eq!(frame.data.len(), 3);
        assert_eq!(slot.seq(), 2);
    }

    #[test]
    fn clear_keeps_seq_monotonic() {
        let slot = FrameSlot::new();
        slot.publish(vec![1], 1, 1);
        slot.clear();
        assert!(slot.latest().is_none());

        slot.publish(vec![2], 1, 1);
        assert_eq!(slot.latest().unwrap().seq, 2);
    }

    #[test]
    fn readers_see_most_recent_frame() {
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 0..100u8 {
                    slot.publish(vec![i], 1, 1);
                }
            })
        };
        writer.join().unwrap();
        assert_eq!(slot.latest().unwrap().data[0], 99);
        assert_eq!(slot.seq(), 100);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_millis(500));
        assert_eq!(backoff.next(), Duration::from_millis(1000));
        assert_eq!(backoff.next(), Duration::from_millis(2000));
        assert_eq!(backoff.next(), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_resets_to_base() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(10));
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(500));
    }

    #[test]
    fn start_then_stop_joins_poller() {
        let controller =
            CameraController::new(CameraConfig::default(), StreamConfig::default());
        // Index nobody has; the poller sits in its open-retry loop.
        controller.start(200).unwrap();
        assert_eq!(controller.device_index(), Some(200));

        controller.stop();
        assert_eq!(controller.device_index(), None);
        assert!(controller.slot().latest().is_none());
    }

    #[test]
    fn interruptible_sleep_stops_early() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        sleep_interruptible(&stop, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
