//! Audio reorder and packetization
//!
//! System audio arrives as variable-length chunks that are not always
//! linear in time, and the device clock drifts against a free-running
//! sample counter. This stage restores order with a bounded reorder
//! window, pools raw samples, and cuts them into frames of exactly the
//! configured sample count, periodically re-anchoring the output cursor
//! to the device's own timestamps so drift never accumulates.
//!
//! Trade-off: the window adds `reorder_window` frames of latency in
//! exchange for tolerating bounded out-of-order delivery.

use log::{debug, warn};
use std::collections::BTreeMap;

use super::error::{PipelineError, Result};
use super::types::{AudioFormat, MediaFrame, MediaKind, TickRate};
use crate::resample::Resampler;

/// Configuration for [`AudioPacketizer`]
#[derive(Debug, Clone)]
pub struct PacketizerConfig {
    /// Frames held back before the earliest is forwarded downstream
    pub reorder_window: usize,
    /// Samples per emitted frame; every output has exactly this many
    pub samples_per_frame: usize,
    /// Format every emitted frame is converted to
    pub output_format: AudioFormat,
    /// Tick rate of the audio clock domain
    pub tick_rate: TickRate,
    /// Cursor corrections below this many seconds are logged at debug only
    pub drift_log_threshold: f64,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            reorder_window: 10,
            samples_per_frame: 1024,
            output_format: AudioFormat {
                sample_rate: 48000,
                channels: 2,
                sample_format: super::types::SampleFormat::F32,
            },
            tick_rate: TickRate::per_second(48000),
            drift_log_threshold: 0.1,
        }
    }
}

/// Reorders out-of-order audio and repacketizes it into fixed-size frames
///
/// Emitted frames are monotonically increasing in timestamp and always
/// carry exactly `samples_per_frame` samples (before resampling).
pub struct AudioPacketizer {
    config: PacketizerConfig,
    /// Reorder window keyed by timestamp; duplicate keys are last-write-wins
    window: BTreeMap<i64, MediaFrame>,
    /// Raw interleaved samples awaiting packetization, in pool format
    pool: Vec<u8>,
    /// Format of the samples in the pool, taken from the first ingested frame
    pool_format: Option<AudioFormat>,
    /// Output cursor in audio ticks; the next emitted frame's timestamp
    buffer_pts: i64,
    /// Newest timestamp already forwarded out of the window
    last_forwarded: Option<i64>,
    resyncs: u64,
    violations: u64,
}

impl AudioPacketizer {
    pub fn new(config: PacketizerConfig) -> Self {
        Self {
            config,
            window: BTreeMap::new(),
            pool: Vec::new(),
            pool_format: None,
            buffer_pts: 0,
            last_forwarded: None,
            resyncs: 0,
            violations: 0,
        }
    }

    /// Feed one captured audio frame.
    ///
    /// Frames older than anything already forwarded can no longer be
    /// ordered and are rejected as ordering violations; the pool is left
    /// untouched. Everything else enters the reorder window, and once the
    /// window holds `reorder_window` entries the earliest spills into the
    /// sample pool.
    pub fn push(&mut self, frame: MediaFrame) -> Result<()> {
        if frame.kind != MediaKind::Audio {
            return Err(PipelineError::WrongMediaKind {
                got: frame.kind,
                expected: MediaKind::Audio,
            });
        }

        if let Some(last) = self.last_forwarded
            && frame.pts < last
        {
            self.violations += 1;
            return Err(PipelineError::OrderingViolation {
                got: frame.pts,
                last,
            });
        }

        self.window.insert(frame.pts, frame);

        while self.window.len() >= self.config.reorder_window {
            let (_, earliest) = self.window.pop_first().expect("window entry");
            self.ingest(earliest);
        }
        Ok(())
    }

    /// Move one ordered frame from the window into the sample pool,
    /// re-anchoring the cursor to the frame's device timestamp.
    fn ingest(&mut self, frame: MediaFrame) {
        let format = frame.audio_format().expect("audio frame in window");
        if self.pool_format.is_none() {
            self.pool_format = Some(format);
        }

        // The device clock drifts against our sample-counting cursor.
        // Whenever the frame's own timestamp runs ahead, re-anchor the
        // cursor to source time minus whatever is already pooled.
        if frame.pts > self.buffer_pts {
            let pooled_ticks = self.samples_to_ticks(self.pooled_samples(), format.sample_rate);
            let anchored = (frame.pts - pooled_ticks).max(0);
            if anchored != self.buffer_pts {
                let drift = self
                    .config
                    .tick_rate
                    .ticks_to_seconds((anchored - self.buffer_pts).abs());
                if drift > self.config.drift_log_threshold {
                    warn!(
                        "packetizer: resync cursor {} -> {} ({:.3}s drift)",
                        self.buffer_pts, anchored, drift
                    );
                } else {
                    debug!("packetizer: resync cursor {} -> {}", self.buffer_pts, anchored);
                }
                self.buffer_pts = anchored;
                self.resyncs += 1;
            }
        }

        self.last_forwarded = Some(frame.pts);
        self.pool.extend_from_slice(&frame.data);
        // frame payload released here; the pool owns the samples now
    }

    /// Cut the next fixed-size frame off the pool, if enough is pooled.
    ///
    /// The frame is stamped at the cursor, the cursor advances by the
    /// frame's duration, and the result passes through the resampler
    /// before being handed out. `None` means not enough samples yet.
    pub fn next_frame(&mut self, resampler: &mut dyn Resampler) -> Result<Option<MediaFrame>> {
        let Some(format) = self.pool_format else {
            return Ok(None);
        };
        if self.pooled_samples() < self.config.samples_per_frame {
            return Ok(None);
        }

        let take = self.config.samples_per_frame * format.bytes_per_sample_block();
        let data: Vec<u8> = self.pool.drain(..take).collect();
        let frame = MediaFrame::audio(
            data.into(),
            self.buffer_pts,
            format.sample_rate,
            format.channels,
            format.sample_format,
        );
        self.buffer_pts +=
            self.samples_to_ticks(self.config.samples_per_frame, format.sample_rate);

        let converted = resampler.convert(frame, &self.config.output_format)?;
        Ok(Some(converted))
    }

    pub fn has_next(&self) -> bool {
        self.pool_format.is_some() && self.pooled_samples() >= self.config.samples_per_frame
    }

    /// Sample blocks currently pooled
    pub fn pooled_samples(&self) -> usize {
        match self.pool_format {
            Some(format) => self.pool.len() / format.bytes_per_sample_block(),
            None => 0,
        }
    }

    /// Frames currently held in the reorder window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// (resyncs, ordering violations) counters
    pub fn stats(&self) -> (u64, u64) {
        (self.resyncs, self.violations)
    }

    fn samples_to_ticks(&self, samples: usize, sample_rate: u32) -> i64 {
        let rate = self.config.tick_rate;
        (samples as i128 * rate.num as i128 / (sample_rate as i128 * rate.den as i128)) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SampleFormat;
    use crate::resample::PcmResampler;
    use bytes::Bytes;

    const SAMPLE_RATE: u32 = 48000;

    fn config(window: usize, spf: usize) -> PacketizerConfig {
        PacketizerConfig {
            reorder_window: window,
            samples_per_frame: spf,
            output_format: AudioFormat {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                sample_format: SampleFormat::F32,
            },
            tick_rate: TickRate::per_second(SAMPLE_RATE),
            drift_log_threshold: 0.1,
        }
    }

    /// Mono f32 frame whose samples all carry `value`, timestamped in ticks
    /// equal to sample position.
    fn chunk(pts: i64, samples: usize, value: f32) -> MediaFrame {
        let data: Vec<u8> = std::iter::repeat(value)
            .take(samples)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        MediaFrame::audio(Bytes::from(data), pts, SAMPLE_RATE, 1, SampleFormat::F32)
    }

    #[test]
    fn test_holds_until_window_full() {
        let mut packetizer = AudioPacketizer::new(config(3, 64));
        packetizer.push(chunk(0, 64, 0.0)).unwrap();
        packetizer.push(chunk(64, 64, 0.0)).unwrap();
        // Window below threshold: nothing pooled yet
        assert_eq!(packetizer.pooled_samples(), 0);
        assert_eq!(packetizer.window_len(), 2);

        packetizer.push(chunk(128, 64, 0.0)).unwrap();
        // Third frame fills the window; the earliest spills into the pool
        assert_eq!(packetizer.pooled_samples(), 64);
        assert_eq!(packetizer.window_len(), 2);
    }

    #[test]
    fn test_out_of_order_arrival_is_reordered() {
        let mut packetizer = AudioPacketizer::new(config(3, 32));
        let mut resampler = PcmResampler::new();

        // Arrive out of order; window size 3 forwards in timestamp order
        packetizer.push(chunk(64, 32, 2.0)).unwrap();
        packetizer.push(chunk(0, 32, 1.0)).unwrap();
        packetizer.push(chunk(32, 32, 1.5)).unwrap();
        packetizer.push(chunk(96, 32, 2.5)).unwrap();
        packetizer.push(chunk(128, 32, 3.0)).unwrap();

        // Three frames spilled (0, 32, 64); pool plays back in time order
        let first = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        assert_eq!(first.sample_count(), 32);
        let value = f32::from_le_bytes(first.data[..4].try_into().unwrap());
        assert_eq!(value, 1.0);

        let second = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        let value = f32::from_le_bytes(second.data[..4].try_into().unwrap());
        assert_eq!(value, 1.5);
    }

    #[test]
    fn test_never_emits_short_frames() {
        let mut packetizer = AudioPacketizer::new(config(1, 100));
        let mut resampler = PcmResampler::new();

        packetizer.push(chunk(0, 60, 0.0)).unwrap();
        // 60 pooled samples < 100: try-again, not an error
        assert!(packetizer.next_frame(&mut resampler).unwrap().is_none());

        packetizer.push(chunk(60, 60, 0.0)).unwrap();
        let frame = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        assert_eq!(frame.sample_count(), 100);
        // 20 samples remain pooled, below one frame
        assert!(packetizer.next_frame(&mut resampler).unwrap().is_none());
        assert_eq!(packetizer.pooled_samples(), 20);
    }

    #[test]
    fn test_emitted_timestamps_monotonic_and_contiguous() {
        let mut packetizer = AudioPacketizer::new(config(1, 64));
        let mut resampler = PcmResampler::new();

        for i in 0..8 {
            packetizer.push(chunk(i * 64, 64, 0.0)).unwrap();
        }
        let mut last = None;
        while let Some(frame) = packetizer.next_frame(&mut resampler).unwrap() {
            if let Some(prev) = last {
                assert_eq!(frame.pts, prev + 64);
            }
            last = Some(frame.pts);
        }
        assert!(last.is_some());
    }

    #[test]
    fn test_resync_anchors_cursor_to_source_time() {
        let mut packetizer = AudioPacketizer::new(config(1, 64));
        let mut resampler = PcmResampler::new();

        // Device timestamps run 1000 ticks ahead of zero: the cursor must
        // anchor to source time, not free-run from zero.
        packetizer.push(chunk(1000, 64, 0.0)).unwrap();
        let frame = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        assert_eq!(frame.pts, 1000);

        let (resyncs, _) = packetizer.stats();
        assert!(resyncs >= 1);
    }

    #[test]
    fn test_resync_never_goes_negative() {
        let mut packetizer = AudioPacketizer::new(config(1, 32));
        let mut resampler = PcmResampler::new();

        // 64 samples pooled at cursor 0, then a frame stamped at tick 10:
        // anchoring would put the cursor at 10 - 64 < 0, which clamps to 0.
        packetizer.push(chunk(0, 64, 0.0)).unwrap();
        packetizer.push(chunk(10, 64, 0.0)).unwrap();
        let frame = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        assert_eq!(frame.pts, 0);
    }

    #[test]
    fn test_backward_timestamp_rejected_pool_untouched() {
        let mut packetizer = AudioPacketizer::new(config(1, 256));

        packetizer.push(chunk(100, 64, 0.0)).unwrap();
        packetizer.push(chunk(164, 64, 0.0)).unwrap();
        let pooled = packetizer.pooled_samples();

        let err = packetizer.push(chunk(50, 64, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::OrderingViolation { got: 50, last: 164 }
        ));
        assert_eq!(packetizer.pooled_samples(), pooled);
        let (_, violations) = packetizer.stats();
        assert_eq!(violations, 1);
    }

    #[test]
    fn test_duplicate_timestamp_last_write_wins() {
        let mut packetizer = AudioPacketizer::new(config(4, 32));
        let mut resampler = PcmResampler::new();

        packetizer.push(chunk(0, 32, 1.0)).unwrap();
        packetizer.push(chunk(0, 32, 9.0)).unwrap(); // replaces the first
        packetizer.push(chunk(32, 32, 2.0)).unwrap();
        packetizer.push(chunk(64, 32, 3.0)).unwrap();
        packetizer.push(chunk(96, 32, 4.0)).unwrap();

        let frame = packetizer.next_frame(&mut resampler).unwrap().unwrap();
        let value = f32::from_le_bytes(frame.data[..4].try_into().unwrap());
        assert_eq!(value, 9.0);
    }

    #[test]
    fn test_video_frame_rejected() {
        let mut packetizer = AudioPacketizer::new(config(1, 32));
        let frame = MediaFrame::video(Bytes::from_static(&[0u8; 4]), 0, 2, 1);
        assert!(matches!(
            packetizer.push(frame),
            Err(PipelineError::WrongMediaKind { .. })
        ));
    }
}
