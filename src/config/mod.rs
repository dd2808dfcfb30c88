//! Configuration module.
//!
//! Provides [`AnalyzerConfig`] (top-level settings) with one sub-config per
//! subsystem, [`AppPaths`] for the platform config directory, and TOML
//! persistence via `AnalyzerConfig::load_from` / `AnalyzerConfig::save_to`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AnalysisConfig, AnalyzerConfig, AudioConfig, ConfigError, SinkConfig};
