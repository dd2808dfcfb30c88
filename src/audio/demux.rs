//! Stereo frames and channel demultiplexing.
//!
//! A [`Frame`] is one capture call's worth of interleaved `i16` samples
//! (`L R L R …`).  [`channel_samples`] pulls one channel back out as `f32`
//! so it can be handed to the spectral transform.

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One side of a stereo signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Both channels in publish order.
    pub const BOTH: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Offset of this channel inside an interleaved frame.
    pub fn offset(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }

    /// Tag written at the start of each wire record.
    pub fn tag(self) -> char {
        match self {
            Channel::Left => 'l',
            Channel::Right => 'r',
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Number of interleaved channels in every [`Frame`].
pub const CHANNELS: usize = 2;

/// Interleaved stereo PCM, `frames_per_channel * 2` samples long.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    /// Wrap interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `samples.len()` is not a multiple of [`CHANNELS`].
    pub fn new(samples: Vec<i16>) -> Self {
        assert!(
            samples.len() % CHANNELS == 0,
            "frame length must be a multiple of the channel count"
        );
        Self { samples }
    }

    /// A frame of digital silence.
    pub fn silent(frames_per_channel: usize) -> Self {
        Self::new(vec![0; frames_per_channel * CHANNELS])
    }

    /// Samples in a single channel.
    pub fn frames_per_channel(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Raw interleaved samples.
    pub fn interleaved(&self) -> &[i16] {
        &self.samples
    }
}

// ---------------------------------------------------------------------------
// channel_samples
// ---------------------------------------------------------------------------

/// Take every other sample starting at the channel's offset.
///
/// ```rust
/// use music_analyzer::audio::{channel_samples, Channel, Frame};
///
/// let frame = Frame::new(vec![1, -1, 2, -2, 3, -3]);
/// assert_eq!(channel_samples(&frame, Channel::Left), vec![1.0, 2.0, 3.0]);
/// assert_eq!(channel_samples(&frame, Channel::Right), vec![-1.0, -2.0, -3.0]);
/// ```
pub fn channel_samples(frame: &Frame, channel: Channel) -> Vec<f32> {
    frame
        .samples
        .iter()
        .skip(channel.offset())
        .step_by(CHANNELS)
        .map(|&s| s as f32)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
