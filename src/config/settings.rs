//! Analyzer settings structs, defaults, validation and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  The configuration is
//! built once at startup and handed to every component by reference; nothing
//! reads ambient global state.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A startup parameter that cannot be used to build the pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be > 0")]
    ZeroSampleRate,

    #[error("frame size must be an even number >= 2 (got {0})")]
    BadFrameSize(usize),

    #[error("overlap {overlap} must be >= half of and < the frame size {frame_size}")]
    BadOverlap { overlap: usize, frame_size: usize },

    #[error("frequency bounds must satisfy 0 < low ({low}) < high ({high}) <= nyquist ({nyquist})")]
    BadFrequencyBounds { low: f64, high: f64, nyquist: f64 },

    #[error("band count must be >= 2 (got {0})")]
    BadBandCount(usize),

    #[error("calibration needs at least one frame")]
    NoCalibrationFrames,

    #[error("capture queue capacity must be >= 1")]
    ZeroQueueCapacity,

    #[error("poll interval must be > 0 ms")]
    ZeroPollInterval,
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for stereo audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per channel in one frame; also the transform window length.
    pub frame_size: usize,
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
    /// Frames held between the capture callback and the processing loop.
    /// On overflow the oldest frame is dropped.
    pub queue_capacity: usize,
    /// How long a single frame pull may block before the loop re-checks for
    /// cancellation.
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 1024,
            device: None,
            queue_capacity: 8,
            poll_interval_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Spectral transform and perceptual band settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples shared between successive transform windows.
    pub overlap: usize,
    /// Lower bound of the first perceptual band (Hz).
    pub low_freq: f64,
    /// Upper bound of the last perceptual band (Hz).
    pub high_freq: f64,
    /// Number of ERB-spaced band edges; at most `band_count - 1` bands are
    /// published.
    pub band_count: usize,
    /// Frames transformed before the band map is built.  One is enough: the
    /// bin labels depend only on sample rate and window length.
    pub calibration_frames: usize,
    /// Treat transform labels as bin centres and derive real edges from
    /// them, instead of using each adjacent label pair as a bin interval.
    pub labels_are_centers: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            overlap: 512,
            low_freq: 40.0,
            high_freq: 16_000.0,
            band_count: 24,
            calibration_frames: 1,
            labels_are_centers: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SinkConfig
// ---------------------------------------------------------------------------

/// Output named-pipe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Filesystem path of the FIFO.
    pub fifo_path: PathBuf,
    /// Give up waiting for a reader after this many seconds.  `None` waits
    /// until a reader attaches or the process is cancelled.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            fifo_path: PathBuf::from("/tmp/music_analyzer_fifo"),
            connect_timeout_secs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyzerConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use music_analyzer::config::AnalyzerConfig;
///
/// // Returns Default when the file is missing.
/// let config = AnalyzerConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
    pub sink: SinkConfig,
}

impl AnalyzerConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.  A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Nyquist frequency of the configured capture rate.
    pub fn nyquist(&self) -> f64 {
        self.audio.sample_rate as f64 / 2.0
    }

    /// Check every startup parameter before any device or pipe is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        let analysis = &self.analysis;

        if audio.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if audio.frame_size < 2 || audio.frame_size % 2 != 0 {
            return Err(ConfigError::BadFrameSize(audio.frame_size));
        }
        if analysis.overlap >= audio.frame_size || analysis.overlap * 2 < audio.frame_size {
            return Err(ConfigError::BadOverlap {
                overlap: analysis.overlap,
                frame_size: audio.frame_size,
            });
        }

        let nyquist = self.nyquist();
        let (low, high) = (analysis.low_freq, analysis.high_freq);
        if !(low > 0.0 && low < high && high <= nyquist) {
            return Err(ConfigError::BadFrequencyBounds { low, high, nyquist });
        }
        if analysis.band_count < 2 {
            return Err(ConfigError::BadBandCount(analysis.band_count));
        }
        if analysis.calibration_frames == 0 {
            return Err(ConfigError::NoCalibrationFrames);
        }
        if audio.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if audio.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
