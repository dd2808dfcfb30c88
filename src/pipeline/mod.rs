//! Pipeline orchestration for the analyzer.
//!
//! # Architecture
//!
//! ```text
//! SIGINT / SIGTERM ──▶ CancelToken::cancel()
//!                              │ (polled)
//!                              ▼
//! Orchestrator::run()  ← spawn_blocking thread
//!        │
//!        ├─ RecordSink::prepare / accept             WaitingForSink
//!        ├─ FrameSource::start, calibrate, plan      Calibrating
//!        ├─ loop: next_frame → STFT → reduce → publish  Streaming
//!        └─ close sink, stop capture                 ShuttingDown → Terminated
//!
//! SharedStatus (Arc<Mutex<PipelineStatus>>) ←─── read by the caller
//! ```

pub mod cancel;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use cancel::CancelToken;
pub use runner::{Orchestrator, PipelineError, RunReport, StopReason};
pub use state::{new_shared_status, PipelineState, PipelineStatus, SharedStatus};
