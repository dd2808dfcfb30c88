//! Audio input: stereo capture → frame assembly → bounded queue → demux.
//!
//! # Pipeline
//!
//! ```text
//! Device → cpal callback → FrameAssembler → FrameQueue (drop-oldest)
//!        → FrameSource::next_frame → channel_samples(L) / channel_samples(R)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use music_analyzer::audio::{channel_samples, Channel, CpalCapture, FrameSource};
//! use music_analyzer::config::AudioConfig;
//!
//! let mut capture = CpalCapture::new(&AudioConfig::default()).unwrap();
//! capture.start().unwrap();
//! if let Some(frame) = capture.next_frame(Duration::from_millis(100)).unwrap() {
//!     let left = channel_samples(&frame, Channel::Left);
//!     println!("{} left samples", left.len());
//! }
//! capture.stop().unwrap();
//! ```

pub mod buffer;
pub mod capture;
pub mod demux;

pub use buffer::{FrameAssembler, FrameQueue};
pub use capture::{CaptureError, CpalCapture, FrameSource, StreamHandle};
pub use demux::{channel_samples, Channel, Frame, CHANNELS};
