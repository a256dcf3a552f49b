//! Error taxonomy for the pipeline
//!
//! Components hand back a tri-state outcome: `Ok(Some(_))` is data,
//! `Ok(None)` is "nothing yet, poll again" (an empty queue or a pool below
//! one frame's worth of samples — never logged as an error), and `Err(_)` is
//! a hard failure. Errors never cross a component boundary as panics.

use thiserror::Error;

use crate::resample::ResampleError;
use crate::sink::SinkError;
use crate::source::SourceError;

/// Hard failures surfaced by pipeline components
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A timestamp preceded the last accepted one in its stream. The
    /// offending frame is rejected; pipeline state is untouched.
    #[error("ordering violation: timestamp {got} precedes last accepted {last}")]
    OrderingViolation { got: i64, last: i64 },

    /// A capture source cannot be read or reopened
    #[error("source fatal: {0}")]
    Source(#[from] SourceError),

    /// The resampler collaborator rejected a frame
    #[error("resample failed: {0}")]
    Resample(#[from] ResampleError),

    /// The output sink reported a hard failure
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    /// A frame of the wrong media kind reached a single-kind stage
    #[error("unexpected {got} frame in {expected} path")]
    WrongMediaKind {
        got: crate::pipeline::MediaKind,
        expected: crate::pipeline::MediaKind,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
