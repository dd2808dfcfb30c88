//! Perceptual band planner.
//!
//! Maps ERB-spaced perceptual bands onto contiguous ranges of transform-bin
//! indices.  The plan is computed once at startup from the transform's bin
//! labels and then shared read-only by the reducer for both channels.
//!
//! # Algorithm
//!
//! ```text
//! labels ──adjacent pairs──▶ actual bins (upper edge = membership freq)
//! (low, high, count) ──ERB──▶ edges ──adjacent pairs──▶ requested bands
//! for each requested band: indices i with low <= upper(i) <= high
//! fold: band i ─▶ (first(i), first(i+1))   if band i+1 is populated
//!              ─▶ (first(i), last(i))      otherwise
//! ```
//!
//! Bands that capture no bin are dropped.  At low frequencies, where bins
//! are wider than bands, the published band count can therefore be smaller
//! than `count - 1`; [`BandIndexMap::dropped_bands`] reports by how much.

use thiserror::Error;

use super::erb::{edges_from_centers, generate_band_edges, intervals_from_edges, FrequencyInterval};
use crate::config::AnalysisConfig;

// ---------------------------------------------------------------------------
// PlanError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("invalid band plan parameters: {0}")]
    InvalidParameters(String),
}

// ---------------------------------------------------------------------------
// BandIndexMap
// ---------------------------------------------------------------------------

/// Bin index range feeding one published band.
///
/// Reduced as `start..end` when the two differ and as the single bin
/// `start` when they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

/// One [`BandRange`] per populated perceptual band, in ascending frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct BandIndexMap {
    entries: Vec<BandRange>,
    requested: usize,
}

impl BandIndexMap {
    pub fn new(entries: Vec<BandRange>, requested: usize) -> Self {
        Self { entries, requested }
    }

    pub fn entries(&self) -> &[BandRange] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &BandRange> {
        self.entries.iter()
    }

    /// Number of bands that will be published per channel.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bands asked for (`edge count - 1`).
    pub fn requested_bands(&self) -> usize {
        self.requested
    }

    /// Requested bands that captured no bin and were left out.
    pub fn dropped_bands(&self) -> usize {
        self.requested - self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// BandPlanner
// ---------------------------------------------------------------------------

/// Planner parameters; [`BandPlanner::plan`] is a pure function of these and
/// the labels it is given.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPlanner {
    pub low_freq: f64,
    pub high_freq: f64,
    pub band_count: usize,
    pub labels_are_centers: bool,
}

impl BandPlanner {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            low_freq: config.low_freq,
            high_freq: config.high_freq,
            band_count: config.band_count,
            labels_are_centers: config.labels_are_centers,
        }
    }

    pub fn plan(&self, labels: &[f64]) -> Result<BandIndexMap, PlanError> {
        if labels.len() < 2 {
            return Err(PlanError::InvalidParameters(format!(
                "need at least 2 frequency labels (got {})",
                labels.len()
            )));
        }
        let nyquist = labels[labels.len() - 1];
        if self.high_freq > nyquist {
            return Err(PlanError::InvalidParameters(format!(
                "high frequency {} Hz is above the highest bin label {nyquist} Hz",
                self.high_freq
            )));
        }

        let band_edges = generate_band_edges(self.low_freq, self.high_freq, self.band_count)?;
        let requested = intervals_from_edges(&band_edges);

        let actual = if self.labels_are_centers {
            intervals_from_edges(&edges_from_centers(labels))
        } else {
            intervals_from_edges(labels)
        };

        let indices = bin_indices_per_band(&actual, &requested);
        Ok(BandIndexMap::new(fold_index_lists(&indices), requested.len()))
    }
}

/// Plan with the default (upper-edge) label interpretation.
///
/// ```rust
/// use music_analyzer::analysis::plan;
///
/// let labels: Vec<f64> = (0..=512).map(|k| k as f64 * 44_100.0 / 1024.0).collect();
/// let map = plan(&labels, 40.0, 16_000.0, 24).unwrap();
/// assert_eq!(map.len(), 23);
/// ```
pub fn plan(labels: &[f64], low_freq: f64, high_freq: f64, band_count: usize) -> Result<BandIndexMap, PlanError> {
    BandPlanner {
        low_freq,
        high_freq,
        band_count,
        labels_are_centers: false,
    }
    .plan(labels)
}

/// For each requested band, the indices of actual bins whose upper edge
/// falls inside it (closed bounds, so a bin on a shared edge lands in both).
fn bin_indices_per_band(actual: &[FrequencyInterval], requested: &[FrequencyInterval]) -> Vec<Vec<usize>> {
    requested
        .iter()
        .map(|band| {
            actual
                .iter()
                .enumerate()
                .filter(|(_, bin)| band.contains(bin.high))
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

fn fold_index_lists(indices: &[Vec<usize>]) -> Vec<BandRange> {
    let mut entries = Vec::with_capacity(indices.len());
    for (i, band) in indices.iter().enumerate() {
        let (Some(&first), Some(&last)) = (band.first(), band.last()) else {
            continue;
        };
        let end = match indices.get(i + 1).and_then(|next| next.first()) {
            Some(&next_first) => next_first,
            None => last,
        };
        entries.push(BandRange { start: first, end });
    }
    entries
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
