//! Synthetic capture sources
//!
//! Stand-ins for the device layer: a pattern video source with deterministic
//! timing jitter and a sine audio source with irregular chunk sizes and
//! occasional out-of-order delivery. The demo binary runs on these, and the
//! coordinator tests use them unpaced.

use bytes::Bytes;
use log::info;
use std::time::{Duration, Instant};

use super::{CaptureSource, SourceError};
use crate::pipeline::types::{ClockDomain, MediaFrame, MediaKind, SampleFormat, TickRate};

/// Deterministic per-frame timing offsets, cycled. Rough shape of real
/// screen-grab jitter: mostly small, occasionally a whole missed slot.
const VIDEO_JITTER_PATTERN: &[i64] = &[0, 3, -2, 5, -4, 1, 7, -1, 2, 36];

/// Chunk sizes cycled by the audio source, in sample blocks. Mirrors the
/// uneven buffer sizes a loopback device actually delivers.
const AUDIO_CHUNK_PATTERN: &[usize] = &[441, 523, 389, 512, 476, 448];

/// Pattern video source with deterministic jitter
pub struct SyntheticVideoSource {
    width: u32,
    height: u32,
    fps: u32,
    rate: TickRate,
    frames_produced: u64,
    /// Real-time pacing for the demo; tests run unpaced
    paced: bool,
    started: Option<Instant>,
    limit: Option<u64>,
}

impl SyntheticVideoSource {
    pub fn new(width: u32, height: u32, fps: u32, rate: TickRate) -> Self {
        Self {
            width,
            height,
            fps,
            rate,
            frames_produced: 0,
            paced: true,
            started: None,
            limit: None,
        }
    }

    /// Disable real-time pacing and stop after `limit` frames
    pub fn unpaced(mut self, limit: u64) -> Self {
        self.paced = false;
        self.limit = Some(limit);
        self
    }

    fn nominal_pts(&self, index: u64) -> i64 {
        (index as i128 * self.rate.num as i128 / (self.fps as i128 * self.rate.den as i128)) as i64
    }
}

impl CaptureSource for SyntheticVideoSource {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::new(MediaKind::Video, self.rate)
    }

    fn has_next(&self) -> bool {
        match self.limit {
            Some(limit) => self.frames_produced < limit,
            None => true,
        }
    }

    fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        if let Some(limit) = self.limit
            && self.frames_produced >= limit
        {
            return Ok(None);
        }

        let index = self.frames_produced;
        let jitter = VIDEO_JITTER_PATTERN[(index as usize) % VIDEO_JITTER_PATTERN.len()];
        let pts = (self.nominal_pts(index) + jitter).max(0);

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started + Duration::from_secs_f64(index as f64 / self.fps as f64);
            let now = Instant::now();
            if due > now {
                // The one place a producer may block: the simulated device read
                std::thread::sleep(due - now);
            }
        }

        // Flat gray raster, one byte per pixel, frame index in the first byte
        let mut data = vec![0x80u8; (self.width * self.height) as usize];
        data[0] = index as u8;

        self.frames_produced += 1;
        if self.frames_produced == 1 {
            info!("synthetic video: started ({}x{} @ {} fps)", self.width, self.height, self.fps);
        }
        Ok(Some(MediaFrame::video(
            Bytes::from(data),
            pts,
            self.width,
            self.height,
        )))
    }
}

/// Sine audio source with irregular chunk sizes
///
/// Every `swap_every`-th chunk is delivered one position late, exercising
/// the packetizer's reorder window the way a real loopback device does.
pub struct SyntheticAudioSource {
    sample_rate: u32,
    channels: u16,
    rate: TickRate,
    phase: f64,
    samples_produced: u64,
    chunks_produced: u64,
    held_back: Option<MediaFrame>,
    swap_every: u64,
    paced: bool,
    started: Option<Instant>,
    limit: Option<u64>,
}

impl SyntheticAudioSource {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            rate: TickRate::per_second(sample_rate),
            phase: 0.0,
            samples_produced: 0,
            chunks_produced: 0,
            held_back: None,
            swap_every: 7,
            paced: true,
            started: None,
            limit: None,
        }
    }

    /// Disable real-time pacing and stop after `limit` chunks
    pub fn unpaced(mut self, limit: u64) -> Self {
        self.paced = false;
        self.limit = Some(limit);
        self
    }

    /// Deliver chunks strictly in order (no held-back swaps)
    pub fn in_order(mut self) -> Self {
        self.swap_every = 0;
        self
    }

    fn synth_chunk(&mut self) -> MediaFrame {
        let samples = AUDIO_CHUNK_PATTERN[(self.chunks_produced as usize) % AUDIO_CHUNK_PATTERN.len()];
        let pts = self.samples_produced as i64;

        let mut data = Vec::with_capacity(samples * self.channels as usize * 4);
        let step = 440.0 * 2.0 * std::f64::consts::PI / self.sample_rate as f64;
        for _ in 0..samples {
            let value = (self.phase.sin() * 0.25) as f32;
            self.phase += step;
            for _ in 0..self.channels {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }

        self.samples_produced += samples as u64;
        self.chunks_produced += 1;
        MediaFrame::audio(
            Bytes::from(data),
            pts,
            self.sample_rate,
            self.channels,
            SampleFormat::F32,
        )
    }
}

impl CaptureSource for SyntheticAudioSource {
    fn media_kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn clock(&self) -> ClockDomain {
        ClockDomain::new(MediaKind::Audio, self.rate)
    }

    fn has_next(&self) -> bool {
        if self.held_back.is_some() {
            return true;
        }
        match self.limit {
            Some(limit) => self.chunks_produced < limit,
            None => true,
        }
    }

    fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
        if let Some(limit) = self.limit
            && self.chunks_produced >= limit
        {
            // Flush a chunk still held back for the swap
            return Ok(self.held_back.take());
        }

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started
                + Duration::from_secs_f64(self.samples_produced as f64 / self.sample_rate as f64);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        // Held-back chunk goes out one position late
        if let Some(late) = self.held_back.take() {
            return Ok(Some(late));
        }

        let chunk = self.synth_chunk();
        if self.swap_every > 0 && self.chunks_produced % self.swap_every == 0 {
            // Hold this one back and deliver its successor first
            self.held_back = Some(chunk);
            let next = self.synth_chunk();
            return Ok(Some(next));
        }
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_pts_near_cadence() {
        let mut source = SyntheticVideoSource::new(4, 4, 30, TickRate::per_second(1000)).unpaced(20);
        let mut produced = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            // Jitter stays well inside one 33ms slot except the deliberate gap
            let nominal = (produced * 1000 / 30) as i64;
            assert!((frame.pts - nominal).abs() <= 36);
            assert!(frame.pts >= 0);
            produced += 1;
        }
        assert_eq!(produced, 20);
        assert!(!source.has_next());
    }

    #[test]
    fn test_audio_chunks_cover_all_samples() {
        let mut source = SyntheticAudioSource::new(48000, 2).in_order().unpaced(12);
        let mut total = 0u64;
        let mut expected_pts = 0i64;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.pts, expected_pts);
            expected_pts += frame.sample_count() as i64;
            total += frame.sample_count() as u64;
        }
        assert_eq!(total, source.samples_produced);
    }

    #[test]
    fn test_audio_swaps_are_bounded() {
        let mut source = SyntheticAudioSource::new(48000, 1).unpaced(20);
        let mut pts_seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            pts_seen.push(frame.pts);
        }
        // Delivery is out of order somewhere...
        assert!(pts_seen.windows(2).any(|w| w[0] > w[1]));
        // ...but sorting restores a gap-free sample timeline
        pts_seen.sort_unstable();
        for pair in pts_seen.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
