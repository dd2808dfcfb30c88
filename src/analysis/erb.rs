//! Equivalent Rectangular Bandwidth scale and band-edge generation.
//!
//! Bands are spaced evenly on the ERB-rate ("cam") scale, which grows
//! roughly logarithmically with frequency, so low frequencies get narrow
//! bands and high frequencies wide ones.

use super::planner::PlanError;

/// Hz → ERB-rate.
pub fn erb_from_freq(freq: f64) -> f64 {
    9.265 * (1.0 + freq / (24.7 * 9.16)).ln()
}

/// ERB-rate → Hz.
///
/// Uses the Glasberg & Moore inverse rather than the exact inverse of
/// [`erb_from_freq`]; the two drift apart slightly toward the top of the
/// audible range.
pub fn freq_from_erb(cam: f64) -> f64 {
    10f64.powf(cam / 21.4) / 0.00437 - 1.0 / 0.00437
}

// ---------------------------------------------------------------------------
// FrequencyInterval
// ---------------------------------------------------------------------------

/// A `(low, high)` pair in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyInterval {
    pub low: f64,
    pub high: f64,
}

impl FrequencyInterval {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Closed-bounds membership test.
    pub fn contains(&self, freq: f64) -> bool {
        self.low <= freq && freq <= self.high
    }
}

/// Adjacent pairs of `edges` as intervals.
pub fn intervals_from_edges(edges: &[f64]) -> Vec<FrequencyInterval> {
    edges
        .windows(2)
        .map(|pair| FrequencyInterval::new(pair[0], pair[1]))
        .collect()
}

// ---------------------------------------------------------------------------
// generate_band_edges
// ---------------------------------------------------------------------------

/// `count` band edges from `low_freq` to `high_freq`, evenly spaced in ERB
/// rate.  Interior edges are rounded to whole Hz (ties to even); the two end
/// points are used verbatim.
///
/// ```rust
/// use music_analyzer::analysis::generate_band_edges;
///
/// let edges = generate_band_edges(40.0, 16_000.0, 24).unwrap();
/// assert_eq!(edges.len(), 24);
/// assert_eq!(edges[0], 40.0);
/// assert_eq!(edges[1], 93.0);
/// assert_eq!(edges[23], 16_000.0);
/// ```
///
/// # Errors
///
/// [`PlanError::InvalidParameters`] when `low_freq <= 0`,
/// `low_freq >= high_freq`, `count < 2`, or when rounding makes two edges
/// coincide (too many bands for the range).
pub fn generate_band_edges(low_freq: f64, high_freq: f64, count: usize) -> Result<Vec<f64>, PlanError> {
    if !(low_freq > 0.0) {
        return Err(PlanError::InvalidParameters(format!(
            "low frequency must be > 0 Hz (got {low_freq})"
        )));
    }
    if !(low_freq < high_freq) {
        return Err(PlanError::InvalidParameters(format!(
            "low frequency {low_freq} Hz must be below high frequency {high_freq} Hz"
        )));
    }
    if count < 2 {
        return Err(PlanError::InvalidParameters(format!(
            "band edge count must be >= 2 (got {count})"
        )));
    }

    let low_cam = erb_from_freq(low_freq);
    let high_cam = erb_from_freq(high_freq);
    let step = (high_cam - low_cam) / (count - 1) as f64;

    let mut edges = Vec::with_capacity(count);
    edges.push(low_freq);
    for i in 1..count - 1 {
        let cam = low_cam + step * i as f64;
        edges.push(freq_from_erb(cam).round_ties_even());
    }
    edges.push(high_freq);

    if let Some(pair) = edges.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(PlanError::InvalidParameters(format!(
            "{count} bands are too many for {low_freq}-{high_freq} Hz: edges {} and {} coincide",
            pair[0], pair[1]
        )));
    }

    Ok(edges)
}

// ---------------------------------------------------------------------------
// edges_from_centers
// ---------------------------------------------------------------------------

/// Derive bin edges from bin centre frequencies.
///
/// Interior edges sit halfway between neighbouring centres.  The first and
/// last bins are assumed symmetric around their centre; no edge goes below
/// 0 Hz.  The result has `centers.len() + 1` entries (empty for fewer than
/// two centres).
pub fn edges_from_centers(centers: &[f64]) -> Vec<f64> {
    if centers.len() < 2 {
        return Vec::new();
    }

    let mut edges = Vec::with_capacity(centers.len() + 1);
    let first_half = (centers[1] - centers[0]) / 2.0;
    edges.push((centers[0] - first_half).max(0.0));
    edges.extend(centers.windows(2).map(|pair| pair[0] + (pair[1] - pair[0]) / 2.0));

    let last = centers[centers.len() - 1];
    let last_inner = edges[edges.len() - 1];
    edges.push(last + (last - last_inner));
    edges
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
