//! Pipeline state management

use std::time::Instant;

/// Pipeline state machine
///
/// `idle → waiting-for-sources → running → draining → stopped`. Transitions
/// are validated so every stage observes a consistent lifecycle. The
/// waiting state is the startup gate: nothing is forwarded until both
/// sources have produced at least one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is idle and not processing
    Idle,

    /// Producers are up; the startup gate is still closed
    WaitingForSources,

    /// Pipeline is actively merging and forwarding media
    Running {
        /// When the gate opened
        started_at: Instant,
    },

    /// Shutdown requested: producers are being joined, queues discarded
    Draining,

    /// Pipeline has stopped and cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, WaitingForSources) => true,

            (WaitingForSources, Running { .. }) => true,
            (WaitingForSources, Draining) => true, // interrupted before the gate opened

            (Running { .. }, Draining) => true,

            (Draining, Stopped) => true,

            // No restart after stop
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::WaitingForSources => "WaitingForSources",
            PipelineState::Running { .. } => "Running",
            PipelineState::Draining => "Draining",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Check if the pipeline is running
    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    /// Check if the pipeline is stopped or draining
    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Draining)
    }

    /// Get the duration since the gate opened (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
