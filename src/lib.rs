//! Real-time stereo spectrum analyzer.
//!
//! Captures stereo PCM, computes a short-time Fourier transform per channel,
//! folds the bins into ERB-spaced perceptual bands and streams one text
//! record per channel per frame into a named pipe.
//!
//! | module       | role                                              |
//! |--------------|---------------------------------------------------|
//! | [`audio`]    | device capture, frame queue, channel demux        |
//! | [`analysis`] | STFT, ERB band planning, band reduction           |
//! | [`sink`]     | record formatting and the FIFO endpoint           |
//! | [`pipeline`] | state machine tying the above together            |
//! | [`config`]   | TOML settings, defaults and validation            |

pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod sink;
