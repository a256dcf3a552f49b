//! Health counters for the pipeline
//!
//! Every interesting event along the chain increments one of these atomic
//! counters. Transient conditions (empty queue, short pool) are not events
//! and are not counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Health metrics for a running pipeline
///
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Frames discarded while the startup gate was closed
    pub gate_discards: AtomicU64,

    /// Video frames cloned to keep the output cadence constant
    pub video_duplicated: AtomicU64,

    /// Video frames discarded for arriving too early
    pub video_dropped: AtomicU64,

    /// Audio cursor resyncs against device timestamps
    pub audio_resyncs: AtomicU64,

    /// Frames rejected for going backwards in their stream
    pub ordering_violations: AtomicU64,

    /// Frames handed to the sink, in merged order
    pub frames_merged: AtomicU64,

    /// Total payload bytes handed to the sink
    pub bytes_forwarded: AtomicU64,

    /// Frames discarded at shutdown instead of being flushed
    pub shutdown_discards: AtomicU64,

    /// Timestamp (Unix microseconds) of the last frame handed to the sink
    pub last_frame_time: AtomicU64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        Self {
            gate_discards: AtomicU64::new(0),
            video_duplicated: AtomicU64::new(0),
            video_dropped: AtomicU64::new(0),
            audio_resyncs: AtomicU64::new(0),
            ordering_violations: AtomicU64::new(0),
            frames_merged: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
            shutdown_discards: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros),
        }
    }

    pub fn record_gate_discard(&self) {
        self.gate_discards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ordering_violation(&self) {
        self.ordering_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shutdown_discards(&self, count: u64) {
        self.shutdown_discards.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a frame handed to the sink
    pub fn record_merged_frame(&self, size: usize) {
        let now_micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        self.last_frame_time.store(now_micros, Ordering::Relaxed);
        self.frames_merged.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Fold in the (duplicated, dropped) counters from the video buffer
    pub fn set_video_stats(&self, duplicated: u64, dropped: u64) {
        self.video_duplicated.store(duplicated, Ordering::Relaxed);
        self.video_dropped.store(dropped, Ordering::Relaxed);
    }

    /// Fold in the (resyncs, violations) counters from the packetizer
    pub fn set_audio_stats(&self, resyncs: u64, violations: u64) {
        self.audio_resyncs.store(resyncs, Ordering::Relaxed);
        self.ordering_violations.store(violations, Ordering::Relaxed);
    }

    pub fn frames_merged(&self) -> u64 {
        self.frames_merged.load(Ordering::Relaxed)
    }

    /// Check if the pipeline has stalled (no sink frames for the given
    /// duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_frame = self.last_frame_time.load(Ordering::Relaxed);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_micros() as u64;
        now.saturating_sub(last_frame) > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_merged: self.frames_merged.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            gate_discards: self.gate_discards.load(Ordering::Relaxed),
            video_duplicated: self.video_duplicated.load(Ordering::Relaxed),
            video_dropped: self.video_dropped.load(Ordering::Relaxed),
            audio_resyncs: self.audio_resyncs.load(Ordering::Relaxed),
            ordering_violations: self.ordering_violations.load(Ordering::Relaxed),
            shutdown_discards: self.shutdown_discards.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub frames_merged: u64,
    pub bytes_forwarded: u64,
    pub gate_discards: u64,
    pub video_duplicated: u64,
    pub video_dropped: u64,
    pub audio_resyncs: u64,
    pub ordering_violations: u64,
    pub shutdown_discards: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} frames merged ({} bytes), {} gate discards, video {}/{} dup/drop, {} audio resyncs, {} ordering violations, {} discarded at shutdown",
            self.frames_merged,
            self.bytes_forwarded,
            self.gate_discards,
            self.video_duplicated,
            self.video_dropped,
            self.audio_resyncs,
            self.ordering_violations,
            self.shutdown_discards
        )
    }
}
