//! End-to-end runs of the orchestrator against a real named pipe.
//!
//! Capture is replaced by a scripted source so the tests need no audio
//! hardware; everything from the sink handshake to the wire format is the
//! production path.

#![cfg(unix)]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use music_analyzer::audio::{CaptureError, Frame, FrameSource};
use music_analyzer::config::AnalyzerConfig;
use music_analyzer::pipeline::{
    new_shared_status, CancelToken, Orchestrator, PipelineError, PipelineState, StopReason,
};
use music_analyzer::sink::{FifoSink, SinkError};

/// Hands out silent frames, optionally cancelling once `cancel_after`
/// frames have been delivered.
struct ScriptedSource {
    remaining: usize,
    delivered: usize,
    frame_size: usize,
    pace: Duration,
    cancel_after: Option<(usize, CancelToken)>,
}

impl ScriptedSource {
    fn silent(frames: usize) -> Self {
        Self {
            remaining: frames,
            delivered: 0,
            frame_size: 1024,
            pace: Duration::ZERO,
            cancel_after: None,
        }
    }

    fn paced(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    fn cancel_after(mut self, frames: usize, token: &CancelToken) -> Self {
        self.cancel_after = Some((frames, token.clone()));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        if self.remaining == 0 {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        std::thread::sleep(self.pace);
        self.remaining -= 1;
        self.delivered += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.delivered >= *after {
                token.cancel();
            }
        }
        Ok(Some(Frame::silent(self.frame_size)))
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
}

fn config_for(fifo: &Path) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    config.audio.poll_interval_ms = 5;
    config.sink.fifo_path = fifo.to_path_buf();
    config.sink.connect_timeout_secs = Some(10);
    config
}

fn wait_for_fifo(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if std::fs::metadata(path).is_ok_and(|m| m.file_type().is_fifo()) {
            return;
        }
        assert!(Instant::now() < deadline, "fifo never appeared");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Reads up to `limit` lines (all of them when `None`), then hangs up.
fn spawn_reader(path: PathBuf, limit: Option<usize>) -> JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        wait_for_fifo(&path);
        let file = File::open(&path).expect("open read end");
        let lines = BufReader::new(file).lines().map(|l| l.expect("line"));
        match limit {
            Some(n) => lines.take(n).collect(),
            None => lines.collect(),
        }
    })
}

#[test]
fn streams_records_until_cancelled_and_removes_fifo() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("bands");
    let reader = spawn_reader(fifo.clone(), None);

    let cancel = CancelToken::new();
    let status = new_shared_status();
    // One calibration frame plus three published frames.
    let source = ScriptedSource::silent(4).cancel_after(4, &cancel);
    let orchestrator = Orchestrator::new(
        config_for(&fifo),
        Box::new(source),
        Box::new(FifoSink::from_config(&config_for(&fifo).sink)),
        cancel,
        status.clone(),
    )
    .unwrap();

    let report = orchestrator.run().unwrap();
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.frames_published, 3);

    let lines = reader.join().unwrap();
    let zeros = vec!["0"; 23].join(",");
    let expected: Vec<String> = (0..3)
        .flat_map(|seq| [format!("l:{seq}:{zeros}"), format!("r:{seq}:{zeros}")])
        .collect();
    assert_eq!(lines, expected);

    assert!(!fifo.exists());
    assert_eq!(status.lock().unwrap().state, PipelineState::Terminated);
}

#[test]
fn reader_hanging_up_ends_run_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("bands");
    let reader = spawn_reader(fifo.clone(), Some(2));

    // Safety net: cancel if the disconnect is never noticed.
    let cancel = CancelToken::new();
    let watchdog = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(20));
            cancel.cancel();
        })
    };

    let source = ScriptedSource::silent(usize::MAX).paced(Duration::from_millis(1));
    let orchestrator = Orchestrator::new(
        config_for(&fifo),
        Box::new(source),
        Box::new(FifoSink::new(&fifo)),
        cancel,
        new_shared_status(),
    )
    .unwrap();

    let report = orchestrator.run().unwrap();
    let lines = reader.join().unwrap();
    drop(watchdog);

    assert_eq!(report.reason, StopReason::SinkDisconnected);
    assert!(report.frames_published >= 1);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("l:0:"));
    assert!(lines[1].starts_with("r:0:"));
    assert!(!fifo.exists());
}

#[test]
fn no_reader_times_out_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("bands");
    let mut config = config_for(&fifo);
    config.sink.connect_timeout_secs = Some(0);

    let status = new_shared_status();
    let orchestrator = Orchestrator::new(
        config,
        Box::new(ScriptedSource::silent(1)),
        Box::new(FifoSink::new(&fifo)),
        CancelToken::new(),
        status.clone(),
    )
    .unwrap();

    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, PipelineError::Sink(SinkError::Timeout(_))));
    assert!(!fifo.exists());

    let status = status.lock().unwrap();
    assert_eq!(status.state, PipelineState::Terminated);
    assert!(status.last_error.is_some());
}

#[test]
fn cancel_while_waiting_for_reader() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("bands");

    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.cancel();
    });

    let mut config = config_for(&fifo);
    config.sink.connect_timeout_secs = None;
    let orchestrator = Orchestrator::new(
        config,
        Box::new(ScriptedSource::silent(1)),
        Box::new(FifoSink::new(&fifo)),
        cancel,
        new_shared_status(),
    )
    .unwrap();

    let report = orchestrator.run().unwrap();
    canceller.join().unwrap();
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.frames_published, 0);
    assert!(!fifo.exists());
}

#[test]
fn stalled_reader_does_not_block_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("bands");

    // Opens the pipe and never reads until released.
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let reader_path = fifo.clone();
    let reader = std::thread::spawn(move || {
        wait_for_fifo(&reader_path);
        let file = File::open(&reader_path).expect("open read end");
        let _ = release_rx.recv();
        drop(file);
    });

    let cancel = CancelToken::new();
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let runner = {
        let cancel = cancel.clone();
        let fifo = fifo.clone();
        std::thread::spawn(move || {
            let source = ScriptedSource::silent(usize::MAX);
            let orchestrator = Orchestrator::new(
                config_for(&fifo),
                Box::new(source),
                Box::new(FifoSink::new(&fifo)),
                cancel,
                new_shared_status(),
            )
            .unwrap();
            let _ = done_tx.send(orchestrator.run());
        })
    };

    std::thread::sleep(Duration::from_millis(500));
    cancel.cancel();

    let outcome = done_rx.recv_timeout(Duration::from_secs(5));
    release_tx.send(()).unwrap();
    let report = outcome
        .expect("run returned after cancellation")
        .unwrap();
    runner.join().unwrap();
    reader.join().unwrap();

    assert_eq!(report.reason, StopReason::Cancelled);
    assert!(report.frames_published > 0);
    assert!(!fifo.exists());
}
