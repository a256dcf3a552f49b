//! Constant-frame-rate video buffer
//!
//! Screen grabs arrive whenever the capture thread manages to produce them;
//! the output needs one frame every `interval` ticks, no more and no less.
//! This buffer normalizes irregular arrival timing by snapping near misses
//! onto the cadence, cloning the previous frame across gaps, and discarding
//! frames that land too early to matter.
//!
//! The newest buffered frame is never handed out: it is retained as the
//! reference tail so a future gap can be filled with its content. The ideal
//! (unquantized) tail position is tracked separately in `precise_tail_pts`
//! so quantizing emitted timestamps never accumulates rounding drift.

use log::debug;
use std::collections::VecDeque;

use super::types::MediaFrame;

/// Normalizes irregular video timing to a fixed PTS interval
///
/// Every emitted frame's timestamp is `first_pts + k * interval` for some
/// integer `k >= 0`, strictly increasing by one interval per frame.
pub struct CfrVideoBuffer {
    buf: VecDeque<MediaFrame>,
    /// Output cadence in ticks per frame. May be fractional (e.g. 1000/30).
    interval: f64,
    /// Ideal position of the buffered tail, before quantization
    precise_tail_pts: f64,
    /// Frames cloned to fill gaps
    duplicated: u64,
    /// Frames discarded for arriving too early
    dropped: u64,
}

impl CfrVideoBuffer {
    /// Create a buffer emitting one frame every `interval` ticks
    pub fn new(interval: f64) -> Self {
        Self {
            buf: VecDeque::new(),
            interval,
            precise_tail_pts: 0.0,
            duplicated: 0,
            dropped: 0,
        }
    }

    /// Feed one captured frame into the buffer.
    ///
    /// The first frame ever seen seeds the cadence. After that each frame is
    /// placed against `next_tail = precise_tail_pts + interval`:
    /// more than one interval late clones the current tail into the gap
    /// (repeatedly, until the gap closes); within one interval late or half
    /// an interval early snaps onto `next_tail`; anything earlier is
    /// discarded without touching the cadence.
    pub fn consume(&mut self, mut frame: MediaFrame) {
        if self.buf.is_empty() {
            self.precise_tail_pts = frame.pts as f64;
            self.buf.push_back(frame);
            return;
        }

        // Gap filling is a bounded loop, one clone per missed slot.
        loop {
            let next_tail = self.precise_tail_pts + self.interval;
            let two_frames_late = next_tail + self.interval;
            let half_frame_early = next_tail - self.interval / 2.0;
            let pts = frame.pts as f64;

            if pts > two_frames_late {
                // Frame is late by more than one slot: the previous tail
                // stands in for the missed slot, then this frame is placed
                // against the advanced cadence.
                let mut clone = self.buf.back().expect("tail frame").clone();
                clone.pts = next_tail as i64;
                self.precise_tail_pts = next_tail;
                self.buf.push_back(clone);
                self.duplicated += 1;
            } else if pts >= half_frame_early {
                // Late within one slot, or early within half a slot: mangle
                // the timestamp and accept as is.
                frame.pts = next_tail as i64;
                self.precise_tail_pts = next_tail;
                self.buf.push_back(frame);
                return;
            } else {
                // Too early to consider. Toss it out with yesterday's garbage.
                debug!(
                    "cfr: dropping early frame pts={} (next slot at {:.1})",
                    frame.pts, next_tail
                );
                self.dropped += 1;
                return;
            }
        }
    }

    /// Pop the oldest normalized frame.
    ///
    /// Valid only while at least two frames are buffered; the newest stays
    /// behind as the reference tail. `None` is a try-again condition.
    pub fn get_next(&mut self) -> Option<MediaFrame> {
        if self.buf.len() < 2 {
            return None;
        }
        self.buf.pop_front()
    }

    pub fn has_next(&self) -> bool {
        self.buf.len() > 1
    }

    /// Number of buffered frames, including the retained tail
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// (duplicated, dropped) counters
    pub fn stats(&self) -> (u64, u64) {
        (self.duplicated, self.dropped)
    }
}
