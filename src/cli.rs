use std::path::PathBuf;

use clap::Parser;

use crate::config::AnalyzerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "music-analyzer",
    version,
    about = "Streams ERB band magnitudes of live stereo audio into a named pipe"
)]
pub struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named pipe to publish records on
    #[arg(short, long)]
    pub fifo: Option<PathBuf>,

    /// Input device name (system default when omitted)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Number of ERB band edges
    #[arg(short, long)]
    pub bands: Option<usize>,

    /// Lowest band edge in Hz
    #[arg(long)]
    pub low_freq: Option<f64>,

    /// Highest band edge in Hz (at most half the sample rate)
    #[arg(long)]
    pub high_freq: Option<f64>,

    /// Seconds to wait for a reader before giving up
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Write the effective settings to the config file and exit
    #[arg(long)]
    pub write_default_config: bool,
}

impl Cli {
    /// Overlay the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut AnalyzerConfig) {
        if let Some(fifo) = &self.fifo {
            config.sink.fifo_path = fifo.clone();
        }
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(bands) = self.bands {
            config.analysis.band_count = bands;
        }
        if let Some(low) = self.low_freq {
            config.analysis.low_freq = low;
        }
        if let Some(high) = self.high_freq {
            config.analysis.high_freq = high;
        }
        if let Some(secs) = self.connect_timeout {
            config.sink.connect_timeout_secs = Some(secs);
        }
    }
}
