//! Application entry point for the music analyzer.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line and load [`AnalyzerConfig`] (defaults on first
//!    run), then apply CLI overrides and validate.
//! 3. Create the [`tokio`] runtime.
//! 4. Spawn the signal watcher: the first SIGINT / SIGTERM cancels the
//!    pipeline, a second one removes the FIFO and exits immediately.
//! 5. Open capture and sink on a blocking thread and run the
//!    [`Orchestrator`] there until it stops.
//!
//! Records are published over a named pipe, so the binary only runs on
//! Unix hosts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use music_analyzer::{
    cli::Cli,
    config::{AnalyzerConfig, AppPaths},
    pipeline::{new_shared_status, CancelToken, RunReport, SharedStatus},
};
#[cfg(unix)]
use music_analyzer::{audio::CpalCapture, pipeline::Orchestrator, sink::FifoSink};

/// Exit status after a forced second-signal shutdown (128 + SIGINT).
const FORCED_EXIT: i32 = 130;

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[cfg(unix)]
async fn terminate_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => sigterm.recv().await.is_some(),
        Err(e) => {
            log::warn!("cannot install SIGTERM handler ({e}); only Ctrl-C will stop the analyzer");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() -> bool {
    std::future::pending().await
}

/// Wait for one SIGINT or SIGTERM.  `false` when no handler could be
/// installed.
async fn next_signal() -> bool {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                log::info!("received SIGINT");
                true
            }
            Err(e) => {
                log::warn!("Ctrl-C handler failed: {e}");
                false
            }
        },
        received = terminate_signal() => {
            log::info!("received SIGTERM");
            received
        }
    }
}

/// First signal requests a clean shutdown; a second one forces it.
async fn watch_signals(cancel: CancelToken, fifo_path: PathBuf) {
    if !next_signal().await {
        return;
    }
    log::info!("shutting down (signal again to force)");
    cancel.cancel();

    if !next_signal().await {
        return;
    }
    log::warn!("forced exit");
    if let Err(e) = std::fs::remove_file(&fifo_path) {
        log::debug!("could not remove {}: {e}", fifo_path.display());
    }
    std::process::exit(FORCED_EXIT);
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[cfg(unix)]
async fn run_pipeline(config: AnalyzerConfig, cancel: CancelToken, status: SharedStatus) -> Result<RunReport> {
    tokio::spawn(watch_signals(cancel.clone(), config.sink.fifo_path.clone()));

    // The cpal stream is not `Send`, so the capture is opened on the same
    // thread that drives it.
    let worker = tokio::task::spawn_blocking(move || -> Result<RunReport> {
        let source = CpalCapture::new(&config.audio).context("cannot open audio input")?;
        let sink = FifoSink::from_config(&config.sink);
        let orchestrator = Orchestrator::new(config, Box::new(source), Box::new(sink), cancel, status)?;
        Ok(orchestrator.run()?)
    });

    worker.await.context("pipeline thread panicked")?
}

#[cfg(not(unix))]
async fn run_pipeline(_config: AnalyzerConfig, _cancel: CancelToken, _status: SharedStatus) -> Result<RunReport> {
    anyhow::bail!("music-analyzer publishes over a named pipe and needs a Unix host")
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Configuration
    let cli = Cli::parse();
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);
    let mut config = AnalyzerConfig::load_from(&settings_file)
        .with_context(|| format!("failed to read {}", settings_file.display()))?;
    cli.apply(&mut config);

    if cli.write_default_config {
        config
            .save_to(&settings_file)
            .with_context(|| format!("failed to write {}", settings_file.display()))?;
        log::info!("settings written to {}", settings_file.display());
        return Ok(());
    }
    config.validate().context("invalid settings")?;

    log::info!(
        "music analyzer starting: {} Hz, frame {}, {} bands over {}-{} Hz -> {}",
        config.audio.sample_rate,
        config.audio.frame_size,
        config.analysis.band_count,
        config.analysis.low_freq,
        config.analysis.high_freq,
        config.sink.fifo_path.display()
    );

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4-5. Signal watcher and pipeline
    let cancel = CancelToken::new();
    let status = new_shared_status();
    let report = rt.block_on(run_pipeline(config, cancel, status))?;

    log::info!(
        "music analyzer exiting ({:?}, {} frames published)",
        report.reason,
        report.frames_published
    );
    Ok(())
}
