//! Audio sample conversion
//!
//! The packetizer hands every outgoing frame through a [`Resampler`] before
//! it reaches the merger, so the sink always sees one sample format and
//! rate regardless of what the device delivered. [`PcmResampler`] covers
//! the conversions a capture pipeline actually meets: s16 to f32 and a
//! linear rate conversion. It keeps no state beyond the last sample of the
//! previous frame, used to seed interpolation across frame boundaries.

use bytes::Bytes;
use thiserror::Error;

use crate::pipeline::types::{AudioFormat, MediaFrame, MediaKind, SampleFormat};

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("cannot resample {0} frame")]
    NotAudio(MediaKind),

    #[error("unsupported channel conversion: {from} -> {to}")]
    ChannelMismatch { from: u16, to: u16 },
}

/// Converts audio frames to a target format
pub trait Resampler: Send {
    /// Convert one frame to `target`. The input frame is consumed; the
    /// output keeps its timestamp.
    fn convert(&mut self, frame: MediaFrame, target: &AudioFormat) -> Result<MediaFrame, ResampleError>;
}

/// Pure-PCM resampler: sample-format conversion plus linear rate conversion
///
/// Channel counts must match between input and output; up/downmixing is a
/// codec concern this pipeline does not own.
pub struct PcmResampler {
    /// Last sample block of the previous frame, per channel, for
    /// interpolation continuity across frame boundaries
    history: Vec<f32>,
}

impl PcmResampler {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    fn to_f32(data: &[u8], format: SampleFormat) -> Vec<f32> {
        match format {
            SampleFormat::F32 => data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            SampleFormat::S16 => data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                .collect(),
        }
    }

    fn from_f32(samples: &[f32], format: SampleFormat) -> Vec<u8> {
        match format {
            SampleFormat::F32 => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            SampleFormat::S16 => samples
                .iter()
                .flat_map(|s| {
                    let clamped = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    clamped.to_le_bytes()
                })
                .collect(),
        }
    }

    /// Linear interpolation from `rate_in` to `rate_out`, interleaved
    fn rate_convert(
        &mut self,
        samples: &[f32],
        channels: usize,
        rate_in: u32,
        rate_out: u32,
    ) -> Vec<f32> {
        let blocks_in = samples.len() / channels;
        let blocks_out = (blocks_in as u64 * rate_out as u64 / rate_in as u64) as usize;
        let mut out = Vec::with_capacity(blocks_out * channels);

        let step = rate_in as f64 / rate_out as f64;
        for i in 0..blocks_out {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            for ch in 0..channels {
                let a = samples
                    .get(idx * channels + ch)
                    .copied()
                    .or_else(|| self.history.get(ch).copied())
                    .unwrap_or(0.0);
                let b = samples
                    .get((idx + 1) * channels + ch)
                    .copied()
                    .unwrap_or(a);
                out.push(a + (b - a) * frac);
            }
        }

        self.history.clear();
        if blocks_in > 0 {
            self.history
                .extend_from_slice(&samples[(blocks_in - 1) * channels..]);
        }
        out
    }
}

impl Default for PcmResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for PcmResampler {
    fn convert(&mut self, frame: MediaFrame, target: &AudioFormat) -> Result<MediaFrame, ResampleError> {
        let source = frame
            .audio_format()
            .ok_or(ResampleError::NotAudio(frame.kind))?;

        if source.channels != target.channels {
            return Err(ResampleError::ChannelMismatch {
                from: source.channels,
                to: target.channels,
            });
        }

        // Fast path: nothing to do
        if source == *target {
            return Ok(frame);
        }

        let mut samples = Self::to_f32(&frame.data, source.sample_format);
        if source.sample_rate != target.sample_rate {
            samples = self.rate_convert(
                &samples,
                source.channels as usize,
                source.sample_rate,
                target.sample_rate,
            );
        }
        let data = Self::from_f32(&samples, target.sample_format);

        Ok(MediaFrame::audio(
            Bytes::from(data),
            frame.pts,
            target.sample_rate,
            target.channels,
            target.sample_format,
        ))
    }
}
