//! In-memory sink.  Records every call so tests can inspect what the
//! pipeline wrote and in which order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{RecordSink, SinkError};
use crate::pipeline::CancelToken;

/// Everything a [`MemorySink`] has seen.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub lines: Vec<String>,
    /// Number of lines written at the time of each flush.
    pub flushes: Vec<usize>,
    pub prepared: bool,
    pub accepted: bool,
    pub closed: bool,
    pub close_calls: usize,
}

pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
    /// Writes beyond this many lines fail with [`SinkError::Disconnected`].
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MemoryLog::default())),
            fail_after: None,
        }
    }

    /// Simulate a reader that goes away after `lines` lines.
    pub fn fail_after(mut self, lines: usize) -> Self {
        self.fail_after = Some(lines);
        self
    }

    /// Shared handle that stays readable after the sink has been boxed and
    /// moved into a pipeline.
    pub fn log(&self) -> Arc<Mutex<MemoryLog>> {
        Arc::clone(&self.log)
    }

    /// Copy of the current log.
    pub fn snapshot(&self) -> MemoryLog {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for MemorySink {
    fn prepare(&mut self) -> Result<(), SinkError> {
        self.lock().prepared = true;
        Ok(())
    }

    fn accept(&mut self, _timeout: Option<Duration>, cancel: &CancelToken) -> Result<(), SinkError> {
        if cancel.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        self.lock().accepted = true;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let fail_after = self.fail_after;
        let mut log = self.lock();
        if !log.accepted || log.closed {
            return Err(SinkError::NotConnected);
        }
        if fail_after.is_some_and(|limit| log.lines.len() >= limit) {
            return Err(SinkError::Disconnected);
        }
        log.lines.push(line.to_owned());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let mut log = self.lock();
        if !log.accepted || log.closed {
            return Err(SinkError::NotConnected);
        }
        let written = log.lines.len();
        log.flushes.push(written);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut log = self.lock();
        log.closed = true;
        log.close_calls += 1;
        Ok(())
    }
}
