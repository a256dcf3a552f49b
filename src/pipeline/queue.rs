//! Lock-guarded frame handoff queue
//!
//! One producer thread pushes, the coordinator try-pops. A push never
//! blocks and never fails; the queue is unbounded and growth is the
//! caller's problem. The length counter can be read without taking the
//! lock and is only a hint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::MediaFrame;

/// Thread-safe FIFO handoff for frames between a producer and the coordinator
pub struct FrameQueue {
    inner: Mutex<VecDeque<MediaFrame>>,
    len_hint: AtomicUsize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            len_hint: AtomicUsize::new(0),
        }
    }

    /// Append a frame. Never blocks beyond the queue lock itself.
    pub fn push(&self, frame: MediaFrame) {
        let mut queue = self.inner.lock().unwrap();
        queue.push_back(frame);
        self.len_hint.store(queue.len(), Ordering::Relaxed);
    }

    /// Remove and return the earliest frame, or `None` when empty.
    ///
    /// An empty queue is a try-again condition, not an error.
    pub fn pop_front(&self) -> Option<MediaFrame> {
        let mut queue = self.inner.lock().unwrap();
        let frame = queue.pop_front();
        self.len_hint.store(queue.len(), Ordering::Relaxed);
        frame
    }

    /// Timestamp of the earliest queued frame, if any
    pub fn head_pts(&self) -> Option<i64> {
        self.inner.lock().unwrap().front().map(|f| f.pts)
    }

    pub fn has_next(&self) -> bool {
        self.size() > 0
    }

    /// Approximate queue length, read without the lock
    pub fn size(&self) -> usize {
        self.len_hint.load(Ordering::Relaxed)
    }

    /// Drop everything still queued, returning how many frames were discarded
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.lock().unwrap();
        let dropped = queue.len();
        queue.clear();
        self.len_hint.store(0, Ordering::Relaxed);
        dropped
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MediaFrame;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;

    fn frame(pts: i64) -> MediaFrame {
        MediaFrame::video(Bytes::from_static(&[0u8; 4]), pts, 2, 1)
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new();
        queue.push(frame(1));
        queue.push(frame(2));
        queue.push(frame(3));

        assert_eq!(queue.size(), 3);
        assert_eq!(queue.head_pts(), Some(1));
        assert_eq!(queue.pop_front().unwrap().pts, 1);
        assert_eq!(queue.pop_front().unwrap().pts, 2);
        assert_eq!(queue.pop_front().unwrap().pts, 3);
        assert!(queue.pop_front().is_none());
        assert!(!queue.has_next());
    }

    #[test]
    fn test_empty_pop_is_not_an_error() {
        let queue = FrameQueue::new();
        assert!(queue.pop_front().is_none());
        assert_eq!(queue.head_pts(), None);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_clear_reports_discards() {
        let queue = FrameQueue::new();
        for pts in 0..5 {
            queue.push(frame(pts));
        }
        assert_eq!(queue.clear(), 5);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let producer_queue = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            for pts in 0..1000 {
                producer_queue.push(frame(pts));
            }
        });

        let mut last = -1i64;
        let mut popped = 0;
        while popped < 1000 {
            if let Some(f) = queue.pop_front() {
                assert!(f.pts > last, "FIFO order broken: {} after {}", f.pts, last);
                last = f.pts;
                popped += 1;
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(queue.size(), 0);
    }
}
