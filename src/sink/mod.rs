//! Output sink: where the band records go.
//!
//! # Overview
//!
//! [`RecordSink`] is the byte-stream interface the pipeline writes to.
//! Opening it is a two-phase handshake:
//!
//! 1. [`prepare`](RecordSink::prepare) makes the endpoint exist (creates the
//!    FIFO, or reuses one left behind by an earlier run).
//! 2. [`accept`](RecordSink::accept) blocks until a reader attaches, with an
//!    optional timeout, and gives up early when the pipeline is cancelled.
//!
//! [`FifoSink`] is the production implementation (Unix named pipe).
//! [`MemorySink`] keeps lines in memory for tests and embedding.
//!
//! [`RecordPublisher`] formats [`BandRecord`]s into wire lines and writes one
//! frame (left then right) at a time.

#[cfg(unix)]
pub mod fifo;
pub mod memory;
pub mod record;

#[cfg(unix)]
pub use fifo::FifoSink;
pub use memory::{MemoryLog, MemorySink};
pub use record::{BandRecord, RecordPublisher};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::CancelToken;

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// All errors that can surface while setting up or writing to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The FIFO could not be created (permissions, missing directory, …).
    #[error("cannot create fifo {path}: {reason}")]
    Create { path: PathBuf, reason: String },

    /// Something other than a FIFO already sits at the configured path.
    #[error("{0} exists and is not a fifo")]
    NotAFifo(PathBuf),

    /// Opening the write end failed for a reason other than "no reader yet".
    #[error("cannot open {path} for writing: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no reader attached within {0:?}")]
    Timeout(Duration),

    #[error("cancelled while waiting on the sink")]
    Cancelled,

    #[error("sink is not connected")]
    NotConnected,

    /// The reader went away (`EPIPE`).
    #[error("reader disconnected")]
    Disconnected,

    #[error("sink i/o error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            SinkError::Disconnected
        } else {
            SinkError::Io(err)
        }
    }
}

impl SinkError {
    /// Errors meaning the consumer is gone; the pipeline shuts down cleanly
    /// on these instead of failing.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SinkError::Disconnected | SinkError::Io(_))
    }
}

// ---------------------------------------------------------------------------
// RecordSink trait
// ---------------------------------------------------------------------------

/// A line-oriented byte-stream sink with blocking writes and explicit flush.
pub trait RecordSink: Send {
    /// Phase one of the open handshake: make the endpoint exist.
    /// Reusing an existing endpoint is not an error.
    fn prepare(&mut self) -> Result<(), SinkError>;

    /// Phase two: wait for a reader.  `None` waits indefinitely (still
    /// honouring `cancel`).
    fn accept(&mut self, timeout: Option<Duration>, cancel: &CancelToken) -> Result<(), SinkError>;

    /// Write one record; `line` carries no trailing newline.
    fn write_line(&mut self, line: &str) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;

    /// Release the endpoint and remove any filesystem artifact.  Safe to
    /// call more than once.
    fn close(&mut self) -> Result<(), SinkError>;
}
