//! Frame assembly and the bounded hand-off queue between the capture
//! callback and the processing loop.
//!
//! The cpal callback delivers interleaved samples in whatever block size the
//! host chooses.  [`FrameAssembler`] re-chunks them into fixed-size
//! [`Frame`]s, and [`FrameQueue`] carries those frames to the processing
//! thread.
//!
//! ## Overflow behaviour
//!
//! The queue holds at most `capacity` frames.  When the callback pushes into
//! a full queue the **oldest** frame is discarded, so the callback never
//! blocks and the consumer always sees the most recent audio.  Discarded
//! frames are counted; see [`FrameQueue::dropped`].
//!
//! There is exactly one producer (the audio callback) and one consumer (the
//! orchestrator).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::capture::CaptureError;
use super::demux::{Frame, CHANNELS};

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Accumulates interleaved samples until a full frame is available.
pub struct FrameAssembler {
    pending: Vec<i16>,
    frame_len: usize,
}

impl FrameAssembler {
    /// `frames_per_channel` samples per channel in every emitted frame.
    ///
    /// # Panics
    ///
    /// Panics if `frames_per_channel == 0`.
    pub fn new(frames_per_channel: usize) -> Self {
        assert!(frames_per_channel > 0, "frame size must be > 0");
        let frame_len = frames_per_channel * CHANNELS;
        Self {
            pending: Vec::with_capacity(frame_len),
            frame_len,
        }
    }

    /// Append `data` and call `emit` once per completed frame.  Leftover
    /// samples are kept for the next call.
    pub fn push_slice(&mut self, mut data: &[i16], mut emit: impl FnMut(Frame)) {
        while !data.is_empty() {
            let take = (self.frame_len - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.frame_len {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
                emit(Frame::new(full));
            }
        }
    }

    /// Samples waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// FrameQueue
// ---------------------------------------------------------------------------

struct QueueInner {
    frames: VecDeque<Frame>,
    dropped: u64,
    failure: Option<String>,
}

/// Bounded single-producer / single-consumer frame queue with drop-oldest
/// overflow.
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FrameQueue capacity must be > 0");
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                dropped: 0,
                failure: None,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame.  Returns `false` when an older frame had to be
    /// discarded to make room.
    pub fn push(&self, frame: Frame) -> bool {
        let mut inner = self.lock();
        let mut kept_all = true;
        if inner.frames.len() == self.capacity {
            inner.frames.pop_front();
            inner.dropped += 1;
            kept_all = false;
        }
        inner.frames.push_back(frame);
        drop(inner);
        self.ready.notify_one();
        kept_all
    }

    /// Record a stream failure.  The consumer sees it on its next pull, after
    /// any frames that were already queued.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut inner = self.lock();
        if inner.failure.is_none() {
            inner.failure = Some(reason.into());
        }
        drop(inner);
        self.ready.notify_all();
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` on timeout and [`CaptureError::Stream`] once a
    /// failure has been recorded and the queue has drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        // A timeout too large to represent as an instant waits without limit.
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(reason) = &inner.failure {
                return Err(CaptureError::Stream(reason.clone()));
            }
            inner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.ready
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.ready.wait(inner).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Total frames discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Frames currently waiting.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Returns `true` when no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of frames held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
