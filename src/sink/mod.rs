//! Output sink seam
//!
//! The container/encoder layer lives outside this crate; the coordinator
//! only sees this trait. Frames arrive strictly in presented order, each
//! with its wallclock timestamp in microseconds. A sink distinguishes
//! "not ready, offer the same frame again" from hard failure.

use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::pipeline::types::{MediaFrame, MediaKind};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink closed")]
    Closed,
}

/// Outcome of offering a frame to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Frame accepted and owned by the sink
    Accepted,
    /// Sink cannot take the frame right now; offer it again
    NotReady,
}

/// Consumes the merged, ordered output stream
pub trait OutputSink: Send {
    /// Offer a video frame with its wallclock timestamp in microseconds
    fn push_video_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError>;

    /// Offer an audio frame with its wallclock timestamp in microseconds
    fn push_audio_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError>;

    /// Flush and release underlying resources
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Counts frames and verifies the presented order never goes backwards.
///
/// Default sink of the demo binary; also the assertion point in tests.
pub struct CountingSink {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub bytes: u64,
    last_wallclock: i64,
    out_of_order: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self {
            video_frames: 0,
            audio_frames: 0,
            bytes: 0,
            last_wallclock: i64::MIN,
            out_of_order: 0,
        }
    }

    fn accept(&mut self, frame: &MediaFrame, wallclock_micros: i64) {
        if wallclock_micros < self.last_wallclock {
            self.out_of_order += 1;
            warn!(
                "sink: frame presented out of order ({} after {})",
                wallclock_micros, self.last_wallclock
            );
        }
        self.last_wallclock = wallclock_micros;
        self.bytes += frame.size() as u64;
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }
}

impl Default for CountingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for CountingSink {
    fn push_video_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError> {
        self.accept(&frame, wallclock_micros);
        self.video_frames += 1;
        Ok(SinkStatus::Accepted)
    }

    fn push_audio_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError> {
        self.accept(&frame, wallclock_micros);
        self.audio_frames += 1;
        Ok(SinkStatus::Accepted)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        info!(
            "sink: {} video / {} audio frames, {} bytes",
            self.video_frames, self.audio_frames, self.bytes
        );
        Ok(())
    }
}

/// Writes length-prefixed records to a file
///
/// Record layout: kind byte (`0` audio, `1` video), wallclock microseconds
/// (i64 LE), payload length (u32 LE), payload. Not a media container; just
/// enough structure to replay the merged stream offline.
pub struct FileDumpSink {
    writer: Option<BufWriter<File>>,
    frames: u64,
}

impl FileDumpSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        info!("sink: dumping merged stream to {}", path.display());
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            frames: 0,
        })
    }

    fn write_record(
        &mut self,
        frame: &MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        let kind: u8 = match frame.kind {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
        };
        writer.write_all(&[kind])?;
        writer.write_all(&wallclock_micros.to_le_bytes())?;
        writer.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        writer.write_all(&frame.data)?;
        self.frames += 1;
        Ok(SinkStatus::Accepted)
    }
}

impl OutputSink for FileDumpSink {
    fn push_video_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError> {
        self.write_record(&frame, wallclock_micros)
    }

    fn push_audio_frame(
        &mut self,
        frame: MediaFrame,
        wallclock_micros: i64,
    ) -> Result<SinkStatus, SinkError> {
        self.write_record(&frame, wallclock_micros)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            info!("sink: dump closed after {} frames", self.frames);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::pipeline::types::SampleFormat;

    fn video(pts: i64) -> MediaFrame {
        MediaFrame::video(Bytes::from_static(&[1u8; 6]), pts, 3, 2)
    }

    fn audio(pts: i64) -> MediaFrame {
        MediaFrame::audio(Bytes::from_static(&[0u8; 8]), pts, 48000, 2, SampleFormat::F32)
    }

    #[test]
    fn test_counting_sink_tracks_order() {
        let mut sink = CountingSink::new();
        sink.push_video_frame(video(0), 0).unwrap();
        sink.push_audio_frame(audio(0), 100).unwrap();
        sink.push_video_frame(video(1), 50).unwrap(); // goes backwards

        assert_eq!(sink.video_frames, 2);
        assert_eq!(sink.audio_frames, 1);
        assert_eq!(sink.out_of_order(), 1);
    }

    #[test]
    fn test_file_dump_roundtrip_header() {
        let path = std::env::temp_dir().join("livemux_dump_test.bin");
        let mut sink = FileDumpSink::create(&path).unwrap();
        sink.push_audio_frame(audio(0), 1234).unwrap();
        sink.push_video_frame(video(0), 5678).unwrap();
        sink.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // First record: audio kind byte, wallclock, length 8
        assert_eq!(data[0], 0);
        assert_eq!(i64::from_le_bytes(data[1..9].try_into().unwrap()), 1234);
        assert_eq!(u32::from_le_bytes(data[9..13].try_into().unwrap()), 8);
        // Second record starts after 13 + 8 bytes with the video kind byte
        assert_eq!(data[21], 1);
    }

    #[test]
    fn test_closed_dump_rejects_frames() {
        let path = std::env::temp_dir().join("livemux_dump_closed_test.bin");
        let mut sink = FileDumpSink::create(&path).unwrap();
        sink.close().unwrap();
        let err = sink.push_video_frame(video(0), 0).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, SinkError::Closed));
    }
}
