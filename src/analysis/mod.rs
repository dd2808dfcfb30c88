//! Spectral analysis: STFT, ERB band planning and band reduction.
//!
//! # Architecture
//!
//! ```text
//!  channel samples ──▶ StftAdapter::transform ──▶ Spectrum { frequencies, bins }
//!                                                     │            │
//!                         (once, at startup) ◀────────┘            │
//!  BandPlanner::plan(frequencies) ──▶ BandIndexMap                 │
//!                                          │                       ▼
//!                                          └──────▶ reduce(|bins|, map) ──▶ band magnitudes
//! ```

pub mod erb;
pub mod planner;
pub mod reducer;
pub mod stft;

pub use erb::{
    edges_from_centers, erb_from_freq, freq_from_erb, generate_band_edges, intervals_from_edges,
    FrequencyInterval,
};
pub use planner::{plan, BandIndexMap, BandPlanner, BandRange, PlanError};
pub use reducer::{reduce, ReduceError};
pub use stft::{SpectralTransform, Spectrum, StftAdapter, TransformError};
