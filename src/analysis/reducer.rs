//! Band reducer: averages spectrum magnitudes inside each planned range.

use thiserror::Error;

use super::planner::{BandIndexMap, BandRange};

/// A [`BandIndexMap`] entry that cannot index the spectrum.  Always a
/// planner defect, never a user error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReduceError {
    #[error("band {band}: range {start}..{end} is not valid for {bins} spectrum bins")]
    InvariantViolation {
        band: usize,
        start: usize,
        end: usize,
        bins: usize,
    },
}

/// One mean magnitude per map entry.
///
/// `start..end` is averaged exclusive of `end`; a collapsed entry
/// (`start == end`) yields the single bin `start`.
///
/// ```rust
/// use music_analyzer::analysis::{reduce, BandIndexMap, BandRange};
///
/// let map = BandIndexMap::new(
///     vec![BandRange { start: 0, end: 2 }, BandRange { start: 2, end: 2 }],
///     2,
/// );
/// assert_eq!(reduce(&[1.0, 3.0, 8.0], &map).unwrap(), vec![2.0, 8.0]);
/// ```
pub fn reduce(magnitudes: &[f32], map: &BandIndexMap) -> Result<Vec<f32>, ReduceError> {
    map.iter()
        .enumerate()
        .map(|(band, range)| band_mean(magnitudes, band, *range))
        .collect()
}

fn band_mean(magnitudes: &[f32], band: usize, range: BandRange) -> Result<f32, ReduceError> {
    let BandRange { start, end } = range;
    let valid = start <= end && end < magnitudes.len();
    debug_assert!(
        valid,
        "band {band}: range {start}..{end} out of bounds for {} bins",
        magnitudes.len()
    );
    if !valid {
        return Err(ReduceError::InvariantViolation {
            band,
            start,
            end,
            bins: magnitudes.len(),
        });
    }

    if start == end {
        return Ok(magnitudes[start]);
    }
    let slice = &magnitudes[start..end];
    Ok(slice.iter().sum::<f32>() / slice.len() as f32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::planner::plan;

    fn map_of(ranges: &[(usize, usize)]) -> BandIndexMap {
        BandIndexMap::new(
            ranges
                .iter()
                .map(|&(start, end)| BandRange { start, end })
                .collect(),
            ranges.len(),
        )
    }

    #[test]
    fn averages_half_open_ranges() {
        let mags = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let map = map_of(&[(0, 2), (2, 5), (5, 5)]);
        assert_eq!(reduce(&mags, &map).unwrap(), vec![1.5, 4.0, 6.0]);
    }

    #[test]
    fn constant_spectrum_reduces_to_constant() {
        let labels: Vec<f64> = (0..=512).map(|k| k as f64 * 44_100.0 / 1024.0).collect();
        let map = plan(&labels, 40.0, 16_000.0, 24).unwrap();
        let mags = vec![0.75_f32; labels.len()];

        let bands = reduce(&mags, &map).unwrap();
        assert_eq!(bands.len(), map.len());
        assert!(bands.iter().all(|&b| (b - 0.75).abs() < 1e-6));
    }

    #[test]
    fn zero_spectrum_reduces_to_zero() {
        let mags = vec![0.0_f32; 16];
        let map = map_of(&[(0, 3), (3, 3), (3, 15)]);
        assert_eq!(reduce(&mags, &map).unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_map_gives_no_bands() {
        assert!(reduce(&[1.0, 2.0], &map_of(&[])).unwrap().is_empty());
    }

    // Only reachable in release builds; debug builds trip the assertion.
    #[cfg(not(debug_assertions))]
    #[test]
    fn out_of_range_entry_is_invariant_violation() {
        let err = reduce(&[1.0, 2.0], &map_of(&[(0, 1), (1, 4)])).unwrap_err();
        assert_eq!(
            err,
            ReduceError::InvariantViolation {
                band: 1,
                start: 1,
                end: 4,
                bins: 2
            }
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "out of bounds")]
    fn inverted_entry_panics_in_debug() {
        let _ = reduce(&[1.0, 2.0, 3.0], &map_of(&[(2, 1)]));
    }
}
