//! Short-time Fourier transform adapter.
//!
//! [`StftAdapter`] computes the most recent column of a Hann-windowed STFT
//! over one channel's samples:
//!
//! 1. Pad `window / 2` zeros at both ends of the input.
//! 2. Pad trailing zeros until the hop tiles the padded signal exactly.
//! 3. Take the **last** window-length segment, apply a periodic Hann window,
//!    FFT it and keep the one-sided half (`window / 2 + 1` bins).
//! 4. Scale by `1 / Σ window` so magnitudes are amplitude-normalised.
//!
//! Bin `k` is labelled `k · sample_rate / window` Hz.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

// ---------------------------------------------------------------------------
// TransformError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    #[error("window length must be >= 2 (got {0})")]
    BadWindow(usize),

    #[error("overlap {overlap} must be smaller than the window {window}")]
    BadOverlap { overlap: usize, window: usize },

    #[error("cannot transform an empty sample sequence")]
    EmptyInput,
}

// ---------------------------------------------------------------------------
// Spectrum
// ---------------------------------------------------------------------------

/// Latest spectral slice of one channel.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin frequencies in Hz, ascending, `bins.len()` entries.
    pub frequencies: Arc<[f64]>,
    /// Complex value per bin.
    pub bins: Vec<Complex<f32>>,
}

impl Spectrum {
    /// Magnitude (`|z|`) of every bin.
    pub fn magnitudes(&self) -> Vec<f32> {
        self.bins.iter().map(|c| c.norm()).collect()
    }
}

// ---------------------------------------------------------------------------
// SpectralTransform trait
// ---------------------------------------------------------------------------

/// Turns a mono sample sequence into its latest spectrum.
///
/// Implementations must be deterministic for a given input and
/// configuration.
pub trait SpectralTransform: Send {
    fn transform(&mut self, samples: &[f32]) -> Result<Spectrum, TransformError>;
}

// ---------------------------------------------------------------------------
// StftAdapter
// ---------------------------------------------------------------------------

pub struct StftAdapter {
    window: Vec<f32>,
    /// `1 / Σ window`
    scale: f32,
    hop: usize,
    fft: Arc<dyn Fft<f32>>,
    frequencies: Arc<[f64]>,
    scratch: Vec<Complex<f32>>,
}

impl StftAdapter {
    pub fn new(sample_rate: u32, window_len: usize, overlap: usize) -> Result<Self, TransformError> {
        if window_len < 2 {
            return Err(TransformError::BadWindow(window_len));
        }
        if overlap >= window_len {
            return Err(TransformError::BadOverlap {
                overlap,
                window: window_len,
            });
        }

        let window = hann_window(window_len);
        let scale = 1.0 / window.iter().sum::<f32>();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_len);

        let frequencies: Arc<[f64]> = (0..=window_len / 2)
            .map(|k| k as f64 * sample_rate as f64 / window_len as f64)
            .collect();

        Ok(Self {
            window,
            scale,
            hop: window_len - overlap,
            fft,
            frequencies,
            scratch: vec![Complex::new(0.0, 0.0); window_len],
        })
    }

    /// Bin labels in Hz; identical for every call to [`transform`].
    ///
    /// [`transform`]: SpectralTransform::transform
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Start of the last segment, in padded-signal coordinates.
    fn last_segment_start(&self, input_len: usize) -> usize {
        let n = self.window.len();
        let padded = input_len + 2 * (n / 2);
        let excess = padded.saturating_sub(n) % self.hop;
        let extra = if excess == 0 { 0 } else { self.hop - excess };
        (padded + extra).saturating_sub(n)
    }
}

impl SpectralTransform for StftAdapter {
    fn transform(&mut self, samples: &[f32]) -> Result<Spectrum, TransformError> {
        if samples.is_empty() {
            return Err(TransformError::EmptyInput);
        }

        let n = self.window.len();
        let lead = n / 2;
        let start = self.last_segment_start(samples.len());

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            // Position in the unpadded input; anything outside is zero padding.
            let sample = (start + i)
                .checked_sub(lead)
                .and_then(|pos| samples.get(pos))
                .copied()
                .unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let bins = self.scratch[..=n / 2]
            .iter()
            .map(|&c| c * self.scale)
            .collect();

        Ok(Spectrum {
            frequencies: Arc::clone(&self.frequencies),
            bins,
        })
    }
}

/// Periodic Hann window (DFT-even), the usual choice for spectral analysis.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos()) as f32
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
