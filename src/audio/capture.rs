//! Stereo capture via `cpal`.
//!
//! [`FrameSource`] is the interface the pipeline pulls frames from.
//! [`CpalCapture`] is the production implementation: it opens a 2-channel
//! `i16` input stream at the configured rate, re-chunks the callback data
//! into fixed-size [`Frame`]s and hands them over through a bounded
//! [`FrameQueue`].  The cpal callback thread is the queue's only producer.
//!
//! The running stream lives in a [`StreamHandle`], a RAII guard; dropping
//! it stops the hardware stream.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::{FrameAssembler, FrameQueue};
use super::demux::{Frame, CHANNELS};
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query input configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    /// The device cannot deliver stereo `i16` at the requested rate.
    #[error("input device does not support 2-channel i16 capture at {sample_rate} Hz")]
    UnsupportedConfig { sample_rate: u32 },

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to pause audio stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    /// The device reported an error (overflow, disconnect, …) while running.
    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("capture has not been started")]
    NotStarted,
}

// ---------------------------------------------------------------------------
// FrameSource trait
// ---------------------------------------------------------------------------

/// A blocking source of fixed-size interleaved stereo frames.
///
/// Dropping the source releases the device.
pub trait FrameSource {
    /// Begin capturing.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Wait up to `timeout` for the next full frame.  `Ok(None)` means the
    /// timeout elapsed with no frame available.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError>;

    /// Stop capturing.  Calling this on a stopped source is a no-op.
    fn stop(&mut self) -> Result<(), CaptureError>;
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
pub struct StreamHandle {
    stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Stereo input device wrapper built on top of `cpal`.
pub struct CpalCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    frame_size: usize,
    queue: Arc<FrameQueue>,
    stream: Option<StreamHandle>,
    /// Drop count last written to the log.
    reported_drops: u64,
}

impl CpalCapture {
    /// Open the configured input device (or the system default).
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when the host has no input device,
    /// [`CaptureError::DeviceNotFound`] when `config.device` names a device
    /// that does not exist.
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match &config.device {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().is_ok_and(|name| &name == wanted))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.clone()))?,
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        };

        if !supports_stereo_i16(device.supported_input_configs()?, config.sample_rate) {
            return Err(CaptureError::UnsupportedConfig {
                sample_rate: config.sample_rate,
            });
        }

        let stream_config = cpal::StreamConfig {
            channels: CHANNELS as u16,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "capture: using device {:?} ({} Hz, {} ch, {} samples/frame)",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            config.sample_rate,
            CHANNELS,
            config.frame_size
        );

        Ok(Self {
            device,
            config: stream_config,
            frame_size: config.frame_size,
            queue: Arc::new(FrameQueue::new(config.queue_capacity)),
            stream: None,
            reported_drops: 0,
        })
    }

    fn report_drops(&mut self) {
        let dropped = self.queue.dropped();
        if dropped > self.reported_drops {
            log::warn!(
                "capture: processing fell behind, {} frame(s) dropped ({} total, queue holds {})",
                dropped - self.reported_drops,
                dropped,
                self.queue.capacity()
            );
            self.reported_drops = dropped;
        }
    }
}

/// Whether any of `ranges` offers 2-channel `i16` input at `sample_rate`.
fn supports_stereo_i16(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    sample_rate: u32,
) -> bool {
    ranges.into_iter().any(|range| {
        range.channels() as usize == CHANNELS
            && range.sample_format() == cpal::SampleFormat::I16
            && range.min_sample_rate().0 <= sample_rate
            && sample_rate <= range.max_sample_rate().0
    })
}

impl FrameSource for CpalCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut assembler = FrameAssembler::new(self.frame_size);
        let data_queue = Arc::clone(&self.queue);
        let error_queue = Arc::clone(&self.queue);

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                assembler.push_slice(data, |frame| {
                    data_queue.push(frame);
                });
            },
            move |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
                error_queue.fail(err.to_string());
            },
            None,
        )?;

        stream.play()?;
        self.stream = Some(StreamHandle { stream });
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::NotStarted);
        }
        let frame = self.queue.pop_timeout(timeout)?;
        self.report_drops();
        Ok(frame)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(handle) = self.stream.take() {
            handle.stream.pause()?;
            log::info!("capture: stream stopped");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
