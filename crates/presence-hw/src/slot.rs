//! Single-frame handoff between the capture thread and the consumer.

use crate::frame::Frame;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// No frame newer than the last consumed one arrived in time.
    Timeout,
    /// The producer has gone away and nothing is left to take.
    Closed,
}

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    published: u64,
    dropped: u64,
    closed: bool,
}

/// Latest-wins frame slot.
///
/// A publish replaces whatever is waiting, so a slow consumer sees the most
/// recent frame and never a backlog. Each frame is handed out at most once.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, frame: Frame) {
        let mut state = self.lock();
        if state.frame.replace(frame).is_some() {
            state.dropped += 1;
        }
        state.published += 1;
        self.ready.notify_all();
    }

    /// Wait up to `timeout` for an unconsumed frame and take it.
    pub fn take(&self, timeout: Duration) -> Result<Frame, SlotError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Ok(frame);
            }
            if state.closed {
                return Err(SlotError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SlotError::Timeout);
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wait until at least one frame has ever been published.
    pub fn wait_first(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.published == 0 && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.published > 0
    }

    /// Wake all waiters; later `take` calls fail once the slot is empty.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Frames replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(seq: u64) -> Frame {
        Frame::new(RgbImage::new(2, 2), seq)
    }

    #[test]
    fn test_latest_frame_wins() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        slot.publish(frame(3));
        assert_eq!(slot.take(Duration::ZERO).unwrap().sequence, 3);
        assert_eq!(slot.dropped(), 2);
        assert_eq!(slot.published(), 3);
    }

    #[test]
    fn test_frame_is_taken_once() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        assert!(slot.take(Duration::ZERO).is_ok());
        assert!(matches!(
            slot.take(Duration::from_millis(10)),
            Err(SlotError::Timeout)
        ));
    }

    #[test]
    fn test_take_wakes_on_publish() {
        let slot = Arc::new(FrameSlot::new());
        let producer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                slot.publish(frame(7));
            })
        };
        assert_eq!(slot.take(Duration::from_secs(5)).unwrap().sequence, 7);
        producer.join().unwrap();
    }

    #[test]
    fn test_close_drains_then_fails() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.close();
        assert!(slot.take(Duration::ZERO).is_ok());
        assert!(matches!(
            slot.take(Duration::from_secs(5)),
            Err(SlotError::Closed)
        ));
        assert!(slot.wait_first(Duration::ZERO));
    }

    #[test]
    fn test_wait_first_times_out_without_frames() {
        let slot = FrameSlot::new();
        assert!(!slot.wait_first(Duration::from_millis(10)));
    }
}
