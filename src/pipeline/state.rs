//! Pipeline state machine and the status snapshot shared with the caller.
//!
//! ```text
//! Uninitialized ──▶ WaitingForSink ──reader attached──▶ Calibrating
//!               ──band plan ready──▶ Streaming
//! any state ──cancel / sink gone / capture error──▶ ShuttingDown ──▶ Terminated
//! ```

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Constructed, nothing opened yet.
    #[default]
    Uninitialized,

    /// Sink endpoint exists; waiting for a reader to attach.
    WaitingForSink,

    /// Capture running; frames are transformed but not published while the
    /// band plan is computed.
    Calibrating,

    /// Steady state: one record pair per captured frame.
    Streaming,

    /// Releasing sink and capture.
    ShuttingDown,

    /// Everything released.  Final.
    Terminated,
}

impl PipelineState {
    /// `true` between leaving `Uninitialized` and entering `ShuttingDown`.
    ///
    /// ```
    /// use music_analyzer::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Uninitialized.is_running());
    /// assert!(PipelineState::WaitingForSink.is_running());
    /// assert!(PipelineState::Streaming.is_running());
    /// assert!(!PipelineState::Terminated.is_running());
    /// ```
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            PipelineState::WaitingForSink | PipelineState::Calibrating | PipelineState::Streaming
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::WaitingForSink => "waiting for sink",
            PipelineState::Calibrating => "calibrating",
            PipelineState::Streaming => "streaming",
            PipelineState::ShuttingDown => "shutting down",
            PipelineState::Terminated => "terminated",
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStatus
// ---------------------------------------------------------------------------

/// What an observer outside the processing thread can see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStatus {
    pub state: PipelineState,

    /// Frames whose left and right records were both written and flushed.
    pub frames_published: u64,

    /// Bands published per channel; `0` until calibration finishes.
    pub band_count: usize,

    /// Requested bands left out of the plan because no bin fell inside them.
    pub dropped_bands: usize,

    /// Message of the error that ended the run, if any.
    pub last_error: Option<String>,
}

/// Thread-safe handle to [`PipelineStatus`].  Lock only for short critical
/// sections.
pub type SharedStatus = Arc<Mutex<PipelineStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(PipelineStatus::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
