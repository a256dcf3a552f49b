//! Globally ordered audio/video merge
//!
//! Mergesort-style management of two timestamp-keyed queues at once: the
//! normalized stages push into their own side, and `pop_next` always
//! returns whichever head is globally earliest. Audio and video ticks live
//! in different units, so every comparison rescales through the configured
//! per-stream tick rates; nothing about the ratio is hardcoded.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use super::types::{MediaFrame, TickRate, cmp_normalized};

/// Tick rates of both merged streams, taken from the sources' clock
/// domains at construction time
#[derive(Debug, Clone, Copy)]
pub struct MergerConfig {
    pub audio_rate: TickRate,
    pub video_rate: TickRate,
}

struct MergerQueues {
    audio: BTreeMap<i64, MediaFrame>,
    video: BTreeMap<i64, MediaFrame>,
}

/// Merges two per-stream queues into one globally time-ordered output
///
/// Pushes are keyed by timestamp with last-write-wins on duplicates. Pops
/// remove the earliest frame across both streams; equal normalized
/// timestamps pop audio first (documented, arbitrary tie-break).
pub struct StreamMerger {
    config: MergerConfig,
    queues: Mutex<MergerQueues>,
    audio_size_estimated: AtomicUsize,
    video_size_estimated: AtomicUsize,
}

impl StreamMerger {
    pub fn new(config: MergerConfig) -> Self {
        Self {
            config,
            queues: Mutex::new(MergerQueues {
                audio: BTreeMap::new(),
                video: BTreeMap::new(),
            }),
            audio_size_estimated: AtomicUsize::new(0),
            video_size_estimated: AtomicUsize::new(0),
        }
    }

    /// Queue a normalized audio frame
    pub fn push_audio(&self, frame: MediaFrame) {
        let mut queues = self.queues.lock().unwrap();
        queues.audio.insert(frame.pts, frame);
        self.audio_size_estimated
            .store(queues.audio.len(), AtomicOrdering::Relaxed);
    }

    /// Queue a normalized video frame
    pub fn push_video(&self, frame: MediaFrame) {
        let mut queues = self.queues.lock().unwrap();
        queues.video.insert(frame.pts, frame);
        self.video_size_estimated
            .store(queues.video.len(), AtomicOrdering::Relaxed);
    }

    /// Pop the globally earliest frame, or `None` when both queues are
    /// empty. Nothing is mutated in the empty case.
    pub fn pop_next(&self) -> Option<MediaFrame> {
        let mut queues = self.queues.lock().unwrap();

        let audio_head = queues.audio.keys().next().copied();
        let video_head = queues.video.keys().next().copied();

        let take_audio = match (audio_head, video_head) {
            (Some(audio_pts), Some(video_pts)) => {
                // Timestamps are presented in different units; rescale
                // through the configured rates before comparing. Ties go
                // to audio.
                cmp_normalized(
                    audio_pts,
                    self.config.audio_rate,
                    video_pts,
                    self.config.video_rate,
                ) != Ordering::Greater
            }
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        let frame = if take_audio {
            let pts = audio_head.expect("audio head");
            queues.audio.remove(&pts)
        } else {
            let pts = video_head.expect("video head");
            queues.video.remove(&pts)
        };
        self.audio_size_estimated
            .store(queues.audio.len(), AtomicOrdering::Relaxed);
        self.video_size_estimated
            .store(queues.video.len(), AtomicOrdering::Relaxed);
        frame
    }

    pub fn has_next(&self) -> bool {
        self.size() > 0
    }

    /// Estimated number of frames queued, read without the lock
    pub fn size(&self) -> usize {
        self.audio_size_estimated.load(AtomicOrdering::Relaxed)
            + self.video_size_estimated.load(AtomicOrdering::Relaxed)
    }

    /// Per-stream estimated sizes (audio, video)
    pub fn sizes(&self) -> (usize, usize) {
        (
            self.audio_size_estimated.load(AtomicOrdering::Relaxed),
            self.video_size_estimated.load(AtomicOrdering::Relaxed),
        )
    }

    /// Drop everything still queued, returning how many frames were
    /// discarded
    pub fn clear(&self) -> usize {
        let mut queues = self.queues.lock().unwrap();
        let dropped = queues.audio.len() + queues.video.len();
        queues.audio.clear();
        queues.video.clear();
        self.audio_size_estimated.store(0, AtomicOrdering::Relaxed);
        self.video_size_estimated.store(0, AtomicOrdering::Relaxed);
        dropped
    }
}
