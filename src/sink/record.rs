//! Band record wire format.
//!
//! One line per channel per frame:
//!
//! ```text
//! <tag>:<sequence>:<v0>,<v1>,...,<vN-1>\n
//! ```
//!
//! `tag` is `l` or `r`, `sequence` is the zero-based frame counter shared by
//! both lines of a frame, and the values are the band magnitudes in
//! ascending frequency order, printed with the shortest decimal form that
//! round-trips (`0` for silence).  The left line always precedes the right
//! line and the sink is flushed after each pair.

use std::fmt;

use super::{RecordSink, SinkError};
use crate::audio::Channel;

#[derive(Debug, Clone, PartialEq)]
pub struct BandRecord {
    pub channel: Channel,
    pub sequence: u64,
    pub magnitudes: Vec<f32>,
}

impl fmt::Display for BandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.channel.tag(), self.sequence)?;
        for (i, value) in self.magnitudes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Writes whole frames (left then right, then flush) to a [`RecordSink`].
#[derive(Debug, Default)]
pub struct RecordPublisher {
    published: u64,
}

impl RecordPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames fully written so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn publish_frame(
        &mut self,
        sink: &mut dyn RecordSink,
        sequence: u64,
        left: &[f32],
        right: &[f32],
    ) -> Result<(), SinkError> {
        for (channel, magnitudes) in [(Channel::Left, left), (Channel::Right, right)] {
            let record = BandRecord {
                channel,
                sequence,
                magnitudes: magnitudes.to_vec(),
            };
            let line = record.to_string();
            log::trace!("{line}");
            sink.write_line(&line)?;
        }
        sink.flush()?;
        self.published += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CancelToken;
    use crate::sink::MemorySink;

    #[test]
    fn formats_silence_as_zeros() {
        let record = BandRecord {
            channel: Channel::Left,
            sequence: 0,
            magnitudes: vec![0.0; 3],
        };
        assert_eq!(record.to_string(), "l:0:0,0,0");
    }

    #[test]
    fn formats_fractional_values() {
        let record = BandRecord {
            channel: Channel::Right,
            sequence: 42,
            magnitudes: vec![0.5, 1.25, 3.0],
        };
        assert_eq!(record.to_string(), "r:42:0.5,1.25,3");
    }

    #[test]
    fn empty_band_list_has_trailing_colon() {
        let record = BandRecord {
            channel: Channel::Left,
            sequence: 7,
            magnitudes: Vec::new(),
        };
        assert_eq!(record.to_string(), "l:7:");
    }

    #[test]
    fn publishes_left_then_right_then_flushes() {
        let mut sink = MemorySink::new();
        let log = sink.log();
        sink.accept(None, &CancelToken::new()).unwrap();

        let mut publisher = RecordPublisher::new();
        publisher.publish_frame(&mut sink, 0, &[1.0, 2.0], &[3.0, 4.0]).unwrap();
        publisher.publish_frame(&mut sink, 1, &[0.0, 0.0], &[0.0, 0.0]).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.lines, vec!["l:0:1,2", "r:0:3,4", "l:1:0,0", "r:1:0,0"]);
        assert_eq!(log.flushes, vec![2, 4]);
        assert_eq!(publisher.published(), 2);
    }

    #[test]
    fn failed_write_does_not_count_frame() {
        let mut sink = MemorySink::new().fail_after(1);
        sink.accept(None, &CancelToken::new()).unwrap();

        let mut publisher = RecordPublisher::new();
        let err = publisher.publish_frame(&mut sink, 0, &[1.0], &[2.0]).unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(publisher.published(), 0);
    }
}
