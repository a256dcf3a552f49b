//! Capture source seam
//!
//! Actual device capture (screen grabbing, system audio loopback) lives
//! outside this crate; the pipeline only sees this trait. A source owns
//! whatever device handle it needs and delivers frames stamped in its own
//! clock domain.

pub mod synthetic;

use thiserror::Error;

use crate::pipeline::types::{ClockDomain, MediaFrame, MediaKind};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("device cannot be opened: {0}")]
    OpenFailed(String),

    #[error("device read failed: {0}")]
    ReadFailed(String),

    #[error("device disconnected")]
    Disconnected,
}

/// One capture device feeding the pipeline
///
/// `next_frame` may block inside the underlying device read; it is the only
/// place a producer thread is allowed to block. `Ok(None)` means no data
/// right now (poll again); `Err` is fatal for this source.
///
/// A source may transparently reopen or reseek its device on end-of-stream,
/// but after reopening it must never deliver a timestamp less than or equal
/// to the last one it delivered.
pub trait CaptureSource: Send {
    /// Media kind this source produces
    fn media_kind(&self) -> MediaKind;

    /// Timestamp domain descriptor for this source's ticks
    fn clock(&self) -> ClockDomain;

    /// Whether a frame is likely available without blocking
    fn has_next(&self) -> bool;

    /// Read the next frame
    fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError>;
}
