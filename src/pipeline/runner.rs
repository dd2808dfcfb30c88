//! Pipeline orchestrator: capture → STFT → band plan → reduce → publish.
//!
//! [`Orchestrator`] owns the frame source, the sink, the spectral transform
//! and the frame counter, and runs synchronously on one thread.
//!
//! # Flow
//!
//! ```text
//! WaitingForSink   sink.prepare() → sink.accept(timeout, cancel)
//! Calibrating      source.start() → transform N frames (nothing published)
//!                  → BandPlanner::plan(last labels)               [once]
//! Streaming        loop {
//!                    next_frame(poll) → demux L/R → transform L, R
//!                    → reduce(|bins|, map) → publish L, R, flush
//!                  }
//! ShuttingDown     sink.close() → source.stop()                   [once]
//! Terminated
//! ```
//!
//! Cancellation is checked between frames and while waiting for one, so a
//! frame that has already been pulled is published in full.  The one
//! exception is a reader that stops draining the pipe: the sink then gives
//! up on the blocked write once cancelled, and the run ends without
//! finishing that frame.

use std::time::Duration;

use thiserror::Error;

use crate::analysis::{reduce, BandIndexMap, BandPlanner, PlanError, ReduceError};
use crate::analysis::{SpectralTransform, StftAdapter, TransformError};
use crate::audio::{channel_samples, CaptureError, Channel, Frame, FrameSource};
use crate::config::{AnalyzerConfig, ConfigError};
use crate::sink::{RecordPublisher, RecordSink, SinkError};

use super::cancel::CancelToken;
use super::state::{PipelineState, SharedStatus};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Fatal pipeline errors.  A vanished reader is not one of them; it ends the
/// run with [`StopReason::SinkDisconnected`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("spectral transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Why a run that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SinkDisconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub reason: StopReason,
    pub frames_published: u64,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one analyzer run from sink handshake to teardown.
///
/// ```rust,no_run
/// use music_analyzer::audio::CpalCapture;
/// use music_analyzer::config::AnalyzerConfig;
/// use music_analyzer::pipeline::{new_shared_status, CancelToken, Orchestrator};
/// use music_analyzer::sink::FifoSink;
///
/// let config = AnalyzerConfig::default();
/// let source = CpalCapture::new(&config.audio).unwrap();
/// let sink = FifoSink::from_config(&config.sink);
///
/// let orchestrator = Orchestrator::new(
///     config,
///     Box::new(source),
///     Box::new(sink),
///     CancelToken::new(),
///     new_shared_status(),
/// )
/// .unwrap();
/// let report = orchestrator.run().unwrap();
/// println!("published {} frames", report.frames_published);
/// ```
pub struct Orchestrator {
    config: AnalyzerConfig,
    source: Box<dyn FrameSource>,
    sink: Box<dyn RecordSink>,
    transform: Box<dyn SpectralTransform>,
    cancel: CancelToken,
    status: SharedStatus,
    publisher: RecordPublisher,
    sequence: u64,
}

impl Orchestrator {
    /// Validate `config` and build the default STFT for it.  Nothing is
    /// opened until [`run`](Self::run).
    pub fn new(
        config: AnalyzerConfig,
        source: Box<dyn FrameSource>,
        sink: Box<dyn RecordSink>,
        cancel: CancelToken,
        status: SharedStatus,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let transform = StftAdapter::new(
            config.audio.sample_rate,
            config.audio.frame_size,
            config.analysis.overlap,
        )?;
        Ok(Self {
            config,
            source,
            sink,
            transform: Box::new(transform),
            cancel,
            status,
            publisher: RecordPublisher::new(),
            sequence: 0,
        })
    }

    /// Replace the spectral transform.
    pub fn with_transform(mut self, transform: Box<dyn SpectralTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Run to completion.  Teardown happens exactly once, whichever way the
    /// run ends.
    pub fn run(mut self) -> Result<RunReport, PipelineError> {
        let outcome = self.drive();
        self.shutdown();

        let frames_published = self.publisher.published();
        match outcome {
            Ok(reason) => {
                log::info!("pipeline: stopped ({reason:?}) after {frames_published} frames");
                self.set_state(PipelineState::Terminated);
                Ok(RunReport {
                    reason,
                    frames_published,
                })
            }
            Err(err) => {
                log::error!("pipeline: {err}");
                if let Ok(mut status) = self.status.lock() {
                    status.last_error = Some(err.to_string());
                }
                self.set_state(PipelineState::Terminated);
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    fn drive(&mut self) -> Result<StopReason, PipelineError> {
        self.set_state(PipelineState::WaitingForSink);
        self.sink.prepare()?;
        let timeout = self.config.sink.connect_timeout_secs.map(Duration::from_secs);
        match self.sink.accept(timeout, &self.cancel) {
            Ok(()) => {}
            Err(SinkError::Cancelled) => return Ok(StopReason::Cancelled),
            Err(err) => return Err(err.into()),
        }

        self.set_state(PipelineState::Calibrating);
        self.source.start()?;
        let Some(map) = self.calibrate()? else {
            return Ok(StopReason::Cancelled);
        };

        self.set_state(PipelineState::Streaming);
        while let Some(frame) = self.next_frame()? {
            let left = self.band_magnitudes(&frame, Channel::Left, &map)?;
            let right = self.band_magnitudes(&frame, Channel::Right, &map)?;

            match self
                .publisher
                .publish_frame(self.sink.as_mut(), self.sequence, &left, &right)
            {
                Ok(()) => {}
                Err(SinkError::Cancelled) => {
                    log::info!("pipeline: cancelled while the reader was not draining the sink");
                    return Ok(StopReason::Cancelled);
                }
                Err(err) if err.is_disconnect() => {
                    log::info!("pipeline: sink closed by reader ({err})");
                    return Ok(StopReason::SinkDisconnected);
                }
                Err(err) => return Err(err.into()),
            }

            self.sequence += 1;
            if let Ok(mut status) = self.status.lock() {
                status.frames_published = self.publisher.published();
            }
        }
        Ok(StopReason::Cancelled)
    }

    /// Transform the configured number of frames without publishing, then
    /// plan from the labels of the last one.  `None` if cancelled first.
    fn calibrate(&mut self) -> Result<Option<BandIndexMap>, PipelineError> {
        let frames = self.config.analysis.calibration_frames;
        let mut labels = None;
        for i in 0..frames {
            let Some(frame) = self.next_frame()? else {
                return Ok(None);
            };
            for channel in Channel::BOTH {
                let spectrum = self.transform.transform(&channel_samples(&frame, channel))?;
                labels = Some(spectrum.frequencies);
            }
            log::debug!("pipeline: calibration frame {}/{frames}", i + 1);
        }

        // validate() guarantees at least one calibration frame.
        let Some(labels) = labels else {
            return Err(ConfigError::NoCalibrationFrames.into());
        };

        let map = BandPlanner::from_config(&self.config.analysis).plan(&labels)?;
        log::info!(
            "pipeline: band plan ready: {} bands over {} bins ({}-{} Hz)",
            map.len(),
            labels.len(),
            self.config.analysis.low_freq,
            self.config.analysis.high_freq
        );
        if map.dropped_bands() > 0 {
            log::warn!(
                "pipeline: {} of {} requested bands captured no bin and were dropped",
                map.dropped_bands(),
                map.requested_bands()
            );
        }
        if let Ok(mut status) = self.status.lock() {
            status.band_count = map.len();
            status.dropped_bands = map.dropped_bands();
        }
        Ok(Some(map))
    }

    fn shutdown(&mut self) {
        self.set_state(PipelineState::ShuttingDown);
        if let Err(err) = self.sink.close() {
            log::warn!("pipeline: closing sink: {err}");
        }
        if let Err(err) = self.source.stop() {
            log::warn!("pipeline: stopping capture: {err}");
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Block until a frame arrives.  `None` once cancellation is requested.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let poll = Duration::from_millis(self.config.audio.poll_interval_ms);
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(frame) = self.source.next_frame(poll)? {
                return Ok(Some(frame));
            }
        }
    }

    fn band_magnitudes(
        &mut self,
        frame: &Frame,
        channel: Channel,
        map: &BandIndexMap,
    ) -> Result<Vec<f32>, PipelineError> {
        let spectrum = self.transform.transform(&channel_samples(frame, channel))?;
        Ok(reduce(&spectrum.magnitudes(), map)?)
    }

    fn set_state(&self, state: PipelineState) {
        if let Ok(mut status) = self.status.lock() {
            if status.state != state {
                log::info!("pipeline: {} -> {}", status.state.label(), state.label());
                status.state = state;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::pipeline::new_shared_status;
    use crate::sink::{MemoryLog, MemorySink};

    /// Replays a fixed list of frames.  Optionally cancels `token` right
    /// after handing out frame number `cancel_after` (1-based), and behaves
    /// like a silent device once the script is exhausted.
    struct ScriptedSource {
        frames: VecDeque<Result<Frame, CaptureError>>,
        delivered: usize,
        cancel_after: Option<(usize, CancelToken)>,
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<Frame, CaptureError>>) -> Self {
            Self {
                frames: frames.into(),
                delivered: 0,
                cancel_after: None,
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn silent(count: usize, frame_size: usize) -> Self {
            Self::new((0..count).map(|_| Ok(Frame::silent(frame_size))).collect())
        }

        fn cancel_after(mut self, frames: usize, token: &CancelToken) -> Self {
            self.cancel_after = Some((frames, token.clone()));
            self
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.events.lock().unwrap().push("start");
            Ok(())
        }

        fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
            match self.frames.pop_front() {
                Some(Ok(frame)) => {
                    self.delivered += 1;
                    if let Some((after, token)) = &self.cancel_after {
                        if self.delivered >= *after {
                            token.cancel();
                        }
                    }
                    Ok(Some(frame))
                }
                Some(Err(err)) => Err(err),
                None => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            }
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            self.events.lock().unwrap().push("stop");
            Ok(())
        }
    }

    fn test_config() -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        config.audio.poll_interval_ms = 5;
        config
    }

    fn run_with(
        source: ScriptedSource,
        sink: MemorySink,
        cancel: CancelToken,
    ) -> (Result<RunReport, PipelineError>, Arc<Mutex<MemoryLog>>, SharedStatus) {
        let log = sink.log();
        let status = new_shared_status();
        let orchestrator = Orchestrator::new(
            test_config(),
            Box::new(source),
            Box::new(sink),
            cancel,
            Arc::clone(&status),
        )
        .unwrap();
        (orchestrator.run(), log, status)
    }

    #[test]
    fn silent_frames_publish_zero_records() {
        let cancel = CancelToken::new();
        // One calibration frame, then two published frames.
        let source = ScriptedSource::silent(3, 1024).cancel_after(3, &cancel);
        let (result, log, status) = run_with(source, MemorySink::new(), cancel);

        let report = result.unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.frames_published, 2);

        let zeros = vec!["0"; 23].join(",");
        let log = log.lock().unwrap();
        assert_eq!(
            log.lines,
            vec![
                format!("l:0:{zeros}"),
                format!("r:0:{zeros}"),
                format!("l:1:{zeros}"),
                format!("r:1:{zeros}"),
            ]
        );
        assert_eq!(log.flushes, vec![2, 4]);
        assert!(log.closed);

        let status = status.lock().unwrap();
        assert_eq!(status.state, PipelineState::Terminated);
        assert_eq!(status.band_count, 23);
        assert_eq!(status.dropped_bands, 0);
        assert_eq!(status.frames_published, 2);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn calibration_publishes_nothing() {
        let cancel = CancelToken::new();
        let source = ScriptedSource::silent(1, 1024).cancel_after(1, &cancel);
        let (result, log, status) = run_with(source, MemorySink::new(), cancel);

        assert_eq!(result.unwrap().frames_published, 0);
        assert!(log.lock().unwrap().lines.is_empty());
        assert_eq!(status.lock().unwrap().band_count, 23);
    }

    #[test]
    fn cancellation_finishes_in_flight_frame_only() {
        let cancel = CancelToken::new();
        // Cancel is raised while frame 2 is being handed out; frames 3..10
        // must never be published.
        let source = ScriptedSource::silent(10, 1024).cancel_after(2, &cancel);
        let (result, log, _) = run_with(source, MemorySink::new(), cancel);

        assert_eq!(result.unwrap().frames_published, 1);
        let log = log.lock().unwrap();
        assert_eq!(log.lines.len(), 2);
        assert!(log.lines[0].starts_with("l:0:"));
        assert!(log.lines[1].starts_with("r:0:"));
        assert_eq!(log.close_calls, 1);
    }

    #[test]
    fn cancellation_on_silent_device_does_not_hang() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let source = ScriptedSource::silent(0, 1024);
        let events = Arc::clone(&source.events);
        let (result, log, status) = run_with(source, MemorySink::new(), cancel);
        canceller.join().unwrap();

        assert_eq!(result.unwrap().reason, StopReason::Cancelled);
        assert!(log.lock().unwrap().closed);
        assert_eq!(*events.lock().unwrap(), vec!["start", "stop"]);
        assert_eq!(status.lock().unwrap().band_count, 0);
    }

    #[test]
    fn cancelled_before_reader_attaches() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let source = ScriptedSource::silent(5, 1024);
        let events = Arc::clone(&source.events);
        let (result, log, _) = run_with(source, MemorySink::new(), cancel);

        assert_eq!(result.unwrap().reason, StopReason::Cancelled);
        // Capture never started; stop is still issued during teardown.
        assert_eq!(*events.lock().unwrap(), vec!["stop"]);
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn reader_going_away_stops_cleanly() {
        // Frame 0 fits, the right line of frame 1 does not.
        let sink = MemorySink::new().fail_after(3);
        let source = ScriptedSource::silent(5, 1024);
        let (result, log, status) = run_with(source, sink, CancelToken::new());

        let report = result.unwrap();
        assert_eq!(report.reason, StopReason::SinkDisconnected);
        assert_eq!(report.frames_published, 1);
        assert!(log.lock().unwrap().closed);
        assert_eq!(status.lock().unwrap().state, PipelineState::Terminated);
    }

    #[test]
    fn capture_failure_is_fatal_after_teardown() {
        let source = ScriptedSource::new(vec![
            Ok(Frame::silent(1024)),
            Ok(Frame::silent(1024)),
            Err(CaptureError::Stream("device unplugged".into())),
        ]);
        let events = Arc::clone(&source.events);
        let (result, log, status) = run_with(source, MemorySink::new(), CancelToken::new());

        assert!(matches!(result, Err(PipelineError::Capture(CaptureError::Stream(_)))));
        assert_eq!(log.lock().unwrap().lines.len(), 2);
        assert!(log.lock().unwrap().closed);
        assert_eq!(*events.lock().unwrap(), vec!["start", "stop"]);

        let status = status.lock().unwrap();
        assert_eq!(status.state, PipelineState::Terminated);
        assert!(status.last_error.as_deref().unwrap().contains("device unplugged"));
    }

    /// Reports the same flat spectrum for every input.
    struct FlatTransform {
        labels: Arc<[f64]>,
        level: f32,
    }

    impl SpectralTransform for FlatTransform {
        fn transform(&mut self, _samples: &[f32]) -> Result<crate::analysis::Spectrum, TransformError> {
            Ok(crate::analysis::Spectrum {
                frequencies: Arc::clone(&self.labels),
                bins: vec![rustfft::num_complex::Complex::new(self.level, 0.0); self.labels.len()],
            })
        }
    }

    #[test]
    fn replacement_transform_feeds_the_bands() {
        let labels: Arc<[f64]> = (0..=512).map(|k| k as f64 * 44_100.0 / 1024.0).collect();
        let cancel = CancelToken::new();
        let source = ScriptedSource::silent(2, 1024).cancel_after(2, &cancel);
        let sink = MemorySink::new();
        let log = sink.log();

        let orchestrator = Orchestrator::new(
            test_config(),
            Box::new(source),
            Box::new(sink),
            cancel,
            new_shared_status(),
        )
        .unwrap()
        .with_transform(Box::new(FlatTransform { labels, level: 0.5 }));

        assert_eq!(orchestrator.run().unwrap().frames_published, 1);
        let halves = vec!["0.5"; 23].join(",");
        assert_eq!(
            log.lock().unwrap().lines,
            vec![format!("l:0:{halves}"), format!("r:0:{halves}")]
        );
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = test_config();
        config.analysis.band_count = 1;
        let result = Orchestrator::new(
            config,
            Box::new(ScriptedSource::silent(0, 1024)),
            Box::new(MemorySink::new()),
            CancelToken::new(),
            new_shared_status(),
        );
        assert!(matches!(result, Err(PipelineError::Config(ConfigError::BadBandCount(1)))));
    }

    #[test]
    fn loud_left_channel_shows_up_only_on_left() {
        // 1 kHz full-scale tone on the left, silence on the right.
        let frame_size = 1024;
        let samples: Vec<i16> = (0..frame_size)
            .flat_map(|n| {
                let t = n as f64 / 44_100.0;
                let l = (2.0 * std::f64::consts::PI * 1_000.0 * t).sin() * 16_000.0;
                [l as i16, 0]
            })
            .collect();
        let cancel = CancelToken::new();
        let source = ScriptedSource::new(vec![
            Ok(Frame::silent(frame_size)),
            Ok(Frame::new(samples)),
        ])
        .cancel_after(2, &cancel);
        let (result, log, _) = run_with(source, MemorySink::new(), cancel);
        assert_eq!(result.unwrap().frames_published, 1);

        let log = log.lock().unwrap();
        let values = |line: &str| -> Vec<f32> {
            line.rsplit(':')
                .next()
                .unwrap()
                .split(',')
                .map(|v| v.parse().unwrap())
                .collect()
        };
        let left = values(&log.lines[0]);
        let right = values(&log.lines[1]);
        assert_eq!(left.len(), 23);
        assert!(left.iter().any(|&v| v > 0.0));
        assert!(right.iter().all(|&v| v == 0.0));
    }
}
