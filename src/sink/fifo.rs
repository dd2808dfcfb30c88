//! Named-pipe sink.
//!
//! Opening a FIFO for writing normally blocks until a reader opens the other
//! end.  [`FifoSink::accept`] instead opens with `O_NONBLOCK`, which fails
//! with `ENXIO` while no reader is attached, and retries on a short poll
//! interval.  That keeps the wait bounded by a timeout and interruptible by
//! cancellation.
//!
//! The descriptor stays non-blocking after the handshake.  A write into a
//! full pipe (reader attached but not reading) is retried until the reader
//! drains it, and gives up with [`SinkError::Cancelled`] once the pipeline
//! is cancelled, so a stalled reader can never wedge shutdown.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use thiserror::Error;

use super::{RecordSink, SinkError};
use crate::config::SinkConfig;
use crate::pipeline::CancelToken;

/// How often `accept` retries the open while no reader is attached.
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// How often a write into a full pipe is retried.
const WRITE_RETRY: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
#[error("write abandoned while the pipe was full")]
struct WriteAbandoned;

/// Write end of the pipe.  Retries `EAGAIN` until the reader makes room,
/// the pipeline is cancelled or the sink is closing.
struct PipeWriter {
    file: File,
    cancel: CancelToken,
    closing: bool,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.file.write(buf) {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if self.closing || self.cancel.is_cancelled() {
                        return Err(io::Error::new(io::ErrorKind::Other, WriteAbandoned));
                    }
                    std::thread::sleep(WRITE_RETRY);
                }
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn write_error(err: io::Error) -> SinkError {
    if err.get_ref().is_some_and(|inner| inner.is::<WriteAbandoned>()) {
        SinkError::Cancelled
    } else {
        err.into()
    }
}

pub struct FifoSink {
    path: PathBuf,
    writer: Option<BufWriter<PipeWriter>>,
    prepared: bool,
}

impl FifoSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            prepared: false,
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(&config.fifo_path)
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// One non-blocking open attempt.  `Ok(None)` means no reader yet.
    fn try_open(&self) -> Result<Option<File>, SinkError> {
        let opened = OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path);

        match opened {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.raw_os_error() == Some(Errno::ENXIO as i32) => Ok(None),
            Err(source) => Err(SinkError::Open {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<PipeWriter>, SinkError> {
        self.writer.as_mut().ok_or(SinkError::NotConnected)
    }
}

impl RecordSink for FifoSink {
    fn prepare(&mut self) -> Result<(), SinkError> {
        match nix::unistd::mkfifo(&self.path, Mode::S_IRUSR | Mode::S_IWUSR) {
            Ok(()) => log::info!("sink: created fifo {}", self.path.display()),
            Err(Errno::EEXIST) => {
                let meta = std::fs::metadata(&self.path).map_err(|e| SinkError::Create {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?;
                if !meta.file_type().is_fifo() {
                    return Err(SinkError::NotAFifo(self.path.clone()));
                }
                log::info!("sink: reusing existing fifo {}", self.path.display());
            }
            Err(errno) => {
                return Err(SinkError::Create {
                    path: self.path.clone(),
                    reason: errno.desc().to_string(),
                })
            }
        }
        self.prepared = true;
        Ok(())
    }

    fn accept(&mut self, timeout: Option<Duration>, cancel: &CancelToken) -> Result<(), SinkError> {
        if self.writer.is_some() {
            return Ok(());
        }

        log::info!("sink: waiting for a reader on {}", self.path.display());
        // A timeout too large to represent as an instant means no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            if let Some(file) = self.try_open()? {
                log::info!("sink: reader attached");
                self.writer = Some(BufWriter::new(PipeWriter {
                    file,
                    cancel: cancel.clone(),
                    closing: false,
                }));
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(SinkError::Cancelled);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    return Err(SinkError::Timeout(timeout));
                }
            }
            std::thread::sleep(ACCEPT_POLL);
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let writer = self.writer()?;
        writer.write_all(line.as_bytes()).map_err(write_error)?;
        writer.write_all(b"\n").map_err(write_error)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer()?.flush().map_err(write_error)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.get_mut().closing = true;
            // The reader may already be gone; nothing left to deliver then.
            if let Err(err) = writer.flush() {
                log::debug!("sink: final flush failed: {err}");
            }
        }

        if self.prepared {
            self.prepared = false;
            match std::fs::symlink_metadata(&self.path) {
                Ok(meta) if meta.file_type().is_fifo() => {
                    std::fs::remove_file(&self.path)?;
                    log::info!("sink: removed fifo {}", self.path.display());
                }
                Ok(_) => log::warn!(
                    "sink: {} is no longer a fifo, leaving it in place",
                    self.path.display()
                ),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl Drop for FifoSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("sink: cleanup on drop failed: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
