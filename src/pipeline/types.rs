//! Core types for the pipeline system

use bytes::Bytes;
use std::cmp::Ordering;

/// Rational tick-to-second scale of a timestamp domain
///
/// A stream's timestamps are integer ticks; `num / den` ticks equal one
/// second. Video typically counts milliseconds (`1000 / 1`), audio counts
/// samples (`48000 / 1`). Raw ticks from different domains must never be
/// compared directly; use [`cmp_normalized`] or convert explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    /// Ticks per `den` seconds
    pub num: u32,
    /// Denominator of the rate
    pub den: u32,
}

impl TickRate {
    /// A rate of `ticks` ticks per second
    pub const fn per_second(ticks: u32) -> Self {
        Self { num: ticks, den: 1 }
    }

    /// Convert a tick count in this domain to seconds
    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.den as f64 / self.num as f64
    }

    /// Convert a tick count in this domain to microseconds
    pub fn ticks_to_micros(&self, ticks: i64) -> i64 {
        (ticks as i128 * 1_000_000 * self.den as i128 / self.num as i128) as i64
    }

    /// Convert a duration in seconds to ticks in this domain
    pub fn seconds_to_ticks(&self, seconds: f64) -> i64 {
        (seconds * self.num as f64 / self.den as f64).round() as i64
    }
}

/// Compare two timestamps from different domains on a common time axis.
///
/// `a_ticks / a_rate` vs `b_ticks / b_rate`, evaluated by cross-multiplying
/// in 128-bit so no precision is lost and no ratio is ever hardcoded.
pub fn cmp_normalized(a_ticks: i64, a_rate: TickRate, b_ticks: i64, b_rate: TickRate) -> Ordering {
    let a = a_ticks as i128 * a_rate.den as i128 * b_rate.num as i128;
    let b = b_ticks as i128 * b_rate.den as i128 * a_rate.num as i128;
    a.cmp(&b)
}

/// Timestamp domain descriptor exposed by a capture source
///
/// Everything downstream needs to interpret a source's ticks: the media kind
/// and the rational tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDomain {
    pub kind: MediaKind,
    pub rate: TickRate,
}

impl ClockDomain {
    pub fn new(kind: MediaKind, rate: TickRate) -> Self {
        Self { kind, rate }
    }
}

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Sample format of raw audio payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit interleaved
    S16,
    /// 32-bit float interleaved
    F32,
}

impl SampleFormat {
    /// Bytes per sample, single channel
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Target format for audio conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Bytes occupied by one interleaved sample across all channels
    pub fn bytes_per_sample_block(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }
}

/// One timestamped unit of media moving through the pipeline
///
/// A frame is owned by exactly one structure at a time and moves by value
/// from producer to queue to buffer to merger to sink. The payload is
/// immutable once handed downstream; only `pts` is rewritten, by the
/// constant-rate video buffer and the audio packetizer.
#[derive(Clone)]
pub struct MediaFrame {
    /// Kind of media (video or audio)
    pub kind: MediaKind,

    /// Raw media payload
    pub data: Bytes,

    /// Presentation timestamp in ticks of the source clock domain
    pub pts: i64,

    /// Frame width (for video only)
    pub width: Option<u32>,

    /// Frame height (for video only)
    pub height: Option<u32>,

    /// Sample rate (for audio only)
    pub sample_rate: Option<u32>,

    /// Number of channels (for audio only)
    pub channels: Option<u16>,

    /// Sample format (for audio only)
    pub sample_format: Option<SampleFormat>,
}

impl MediaFrame {
    /// Create a new video frame
    pub fn video(data: Bytes, pts: i64, width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            data,
            pts,
            width: Some(width),
            height: Some(height),
            sample_rate: None,
            channels: None,
            sample_format: None,
        }
    }

    /// Create a new audio frame
    pub fn audio(
        data: Bytes,
        pts: i64,
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            kind: MediaKind::Audio,
            data,
            pts,
            width: None,
            height: None,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            sample_format: Some(sample_format),
        }
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of per-channel sample blocks in an audio payload
    ///
    /// Returns 0 for video frames.
    pub fn sample_count(&self) -> usize {
        match self.audio_format() {
            Some(fmt) => self.data.len() / fmt.bytes_per_sample_block(),
            None => 0,
        }
    }

    /// The audio format descriptor, if this is an audio frame
    pub fn audio_format(&self) -> Option<AudioFormat> {
        match (self.sample_rate, self.channels, self.sample_format) {
            (Some(sample_rate), Some(channels), Some(sample_format)) => Some(AudioFormat {
                sample_rate,
                channels,
                sample_format,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for MediaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("MediaFrame");
        debug
            .field("kind", &self.kind)
            .field("pts", &self.pts)
            .field("size", &self.size());

        if let Some(width) = self.width {
            debug.field("width", &width);
        }
        if let Some(height) = self.height {
            debug.field("height", &height);
        }
        if let Some(sample_rate) = self.sample_rate {
            debug.field("sample_rate", &sample_rate);
        }
        if let Some(channels) = self.channels {
            debug.field("channels", &channels);
        }

        debug.finish()
    }
}
