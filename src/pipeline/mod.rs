//! Synchronization and buffering core
//!
//! This module turns two independently clocked capture streams into one
//! time-ordered, constant-frame-rate output:
//! - Control/Coordination: producer lifecycle, startup gate, shutdown
//! - Data Transport: one lock-guarded handoff queue per source
//! - Normalization: constant-rate video buffering, audio reorder and
//!   repacketization with drift correction
//! - Merge: globally ordered interleave across both clock domains
//!
//! # Architecture
//!
//! Each capture source runs on its own OS thread and pushes into its
//! queue; the coordinator thread try-pops in normalized time order, feeds
//! the per-kind normalizing stage, and drains the merger to the sink.
//! There is exactly one lock per queue, never held across a blocking
//! call, and the coordinator never blocks on shared state.

pub mod cfr;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod merger;
pub mod packetizer;
pub mod queue;
pub mod state;
pub mod types;

pub use cfr::CfrVideoBuffer;
pub use coordinator::PipelineCoordinator;
pub use error::{PipelineError, Result};
pub use health::{HealthSummary, PipelineHealth};
pub use merger::{MergerConfig, StreamMerger};
pub use packetizer::{AudioPacketizer, PacketizerConfig};
pub use queue::FrameQueue;
pub use state::PipelineState;
pub use types::{AudioFormat, ClockDomain, MediaFrame, MediaKind, SampleFormat, TickRate};
