//! Background capture thread feeding a latest-wins slot.

use crate::frame::{Frame, Rotation};
use crate::slot::{FrameSlot, SlotError};
use crate::source::{CaptureError, FrameSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(50);
/// How long `stop` waits for a capture thread blocked inside a read.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Consumer side of a frame producer.
pub trait FrameFeed: Send {
    /// Block until a frame newer than the last one returned is available.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
    /// Stop producing and free the device. Safe to call more than once.
    fn release(&mut self);
}

/// Owns the capture thread; frames are read from the source as fast as it
/// delivers them and only the newest is kept.
pub struct CaptureThread {
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    frame_timeout: Duration,
    description: String,
}

impl CaptureThread {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        rotation: Rotation,
        frame_timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let slot = Arc::new(FrameSlot::new());
        let stop = Arc::new(AtomicBool::new(false));
        let description = source.describe();

        let handle = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("presence-capture".into())
                .spawn(move || run_capture(source, rotation, &slot, &stop))?
        };

        tracing::info!(source = %description, ?rotation, "capture thread started");
        Ok(Self {
            slot,
            stop,
            handle: Some(handle),
            frame_timeout,
            description,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Wait for the first frame so the sensor has settled before processing.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        self.slot.wait_first(timeout)
    }

    /// Signal the thread and join it. Later calls do nothing.
    ///
    /// A thread still stuck in a source read after [`JOIN_TIMEOUT`] is
    /// detached; it exits on its own once the read returns.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        self.slot.close();

        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if !handle.is_finished() {
            tracing::warn!(
                source = %self.description,
                timeout = ?JOIN_TIMEOUT,
                "capture thread blocked in read; detaching"
            );
        } else if handle.join().is_err() {
            tracing::error!("capture thread panicked");
        }
        tracing::info!(
            source = %self.description,
            published = self.slot.published(),
            dropped = self.slot.dropped(),
            "capture thread stopped"
        );
    }
}

impl FrameFeed for CaptureThread {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.slot.take(self.frame_timeout).map_err(|e| match e {
            SlotError::Timeout => CaptureError::Timeout(self.frame_timeout),
            SlotError::Closed => CaptureError::Stopped,
        })
    }

    fn release(&mut self) {
        self.stop();
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep in short slices so a stop request is seen promptly.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    let mut left = total;
    while !left.is_zero() && !stop.load(Ordering::SeqCst) {
        let step = left.min(STOP_POLL);
        std::thread::sleep(step);
        left -= step;
    }
}

fn run_capture(
    mut source: Box<dyn FrameSource>,
    rotation: Rotation,
    slot: &FrameSlot,
    stop: &AtomicBool,
) {
    let mut sequence = 0u64;
    let mut backoff = INITIAL_BACKOFF;

    while !stop.load(Ordering::SeqCst) {
        match source.open_stream() {
            Ok(mut stream) => {
                while !stop.load(Ordering::SeqCst) {
                    match stream.next_frame() {
                        Ok(image) => {
                            sequence += 1;
                            backoff = INITIAL_BACKOFF;
                            slot.publish(Frame::new(rotation.apply(image), sequence));
                        }
                        Err(CaptureError::Frame(e)) => {
                            tracing::warn!(error = %e, "skipping undecodable frame");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "capture stream failed; reopening");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, retry_in = ?backoff, "failed to open capture stream");
            }
        }

        if stop.load(Ordering::SeqCst) {
            break;
        }
        sleep_unless_stopped(stop, backoff);
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    slot.close();
    tracing::debug!(frames = sequence, "capture loop exited");
}
