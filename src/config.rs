//! Runtime configuration
//!
//! Nominal stream parameters with defaults matching the reference
//! deployment: millisecond video ticks at 30 fps, 48kHz stereo audio
//! counted in sample ticks, 1024-sample output frames behind a 10-frame
//! reorder window.

use once_cell::sync::OnceCell;

use crate::pipeline::merger::MergerConfig;
use crate::pipeline::packetizer::PacketizerConfig;
use crate::pipeline::types::{AudioFormat, SampleFormat, TickRate};

pub const FRAME_RATE: u32 = 30;
pub const FRAME_WIDTH: u32 = 1920;
pub const FRAME_HEIGHT: u32 = 1080;

pub const SAMPLING_RATE: u32 = 48000;
pub const CHANNELS: u16 = 2;
pub const SAMPLES_PER_FRAME: usize = 1024;
pub const REORDER_WINDOW: usize = 10;

pub fn app_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Video stream parameters
#[derive(Debug, Clone)]
pub struct VideoStreamConfig {
    pub width: u32,
    pub height: u32,
    /// Output cadence in frames per second
    pub fps_out: u32,
    /// Tick rate of the video clock domain
    pub tick_rate: TickRate,
}

impl Default for VideoStreamConfig {
    fn default() -> Self {
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            fps_out: FRAME_RATE,
            tick_rate: TickRate::per_second(1000),
        }
    }
}

impl VideoStreamConfig {
    /// Output PTS interval in video ticks per frame; fractional for rates
    /// that do not divide the tick rate
    pub fn pts_interval(&self) -> f64 {
        self.tick_rate.num as f64 / (self.fps_out as f64 * self.tick_rate.den as f64)
    }
}

/// Audio stream parameters
#[derive(Debug, Clone)]
pub struct AudioStreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per emitted frame
    pub samples_per_frame: usize,
    /// Reorder window depth in frames
    pub reorder_window: usize,
    /// Tick rate of the audio clock domain
    pub tick_rate: TickRate,
}

impl Default for AudioStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLING_RATE,
            channels: CHANNELS,
            samples_per_frame: SAMPLES_PER_FRAME,
            reorder_window: REORDER_WINDOW,
            tick_rate: TickRate::per_second(SAMPLING_RATE),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub video: VideoStreamConfig,
    pub audio: AudioStreamConfig,
}

impl PipelineConfig {
    pub fn packetizer_config(&self) -> PacketizerConfig {
        PacketizerConfig {
            reorder_window: self.audio.reorder_window,
            samples_per_frame: self.audio.samples_per_frame,
            output_format: AudioFormat {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                sample_format: SampleFormat::F32,
            },
            tick_rate: self.audio.tick_rate,
            ..PacketizerConfig::default()
        }
    }

    /// Merge comparison rates, taken from the configured streams rather
    /// than any assumed ratio
    pub fn merger_config(&self) -> MergerConfig {
        MergerConfig {
            audio_rate: self.audio.tick_rate,
            video_rate: self.video.tick_rate,
        }
    }
}

static PROCESS_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide one-time initialization.
///
/// Capture backends register global state exactly once per process; every
/// constructor path calls through here, so callers never need to care
/// whether someone else already did. Idempotent and cheap after the first
/// call.
pub fn init() {
    PROCESS_INIT.get_or_init(|| {
        log::debug!("{} {}: process-wide init", app_name(), app_version());
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pts_interval_from_config() {
        let video = VideoStreamConfig::default();
        // 1000 ticks/s at 30 fps
        assert!((video.pts_interval() - 33.333).abs() < 0.001);

        let exact = VideoStreamConfig {
            fps_out: 25,
            ..Default::default()
        };
        assert_eq!(exact.pts_interval(), 40.0);
    }

    #[test]
    fn test_merger_rates_come_from_streams() {
        let config = PipelineConfig::default();
        let merger = config.merger_config();
        assert_eq!(merger.audio_rate, TickRate::per_second(48000));
        assert_eq!(merger.video_rate, TickRate::per_second(1000));
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        init();
    }
}
