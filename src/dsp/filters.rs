//! Digital filter design.
//!
//! - [`LowPassFir`]: windowed-sinc low-pass FIR used as the anti-aliasing
//!   filter of every decimation stage
//!
//! # Example
//!
//! ```
//! use grape_decimator::dsp::filters::LowPassFir;
//!
//! // Anti-aliasing filter for a 20 kHz -> 2 kHz stage
//! let filter = LowPassFir::new(800.0, 20_000.0, 201);
//! assert_eq!(filter.taps(), 201);
//! assert!(filter.gain_at(100.0, 20_000.0) > 0.99);
//! assert!(filter.gain_at(1_500.0, 20_000.0) < 1e-3);
//! ```

use std::f64::consts::PI;

/// Finite Impulse Response (FIR) low-pass filter.
///
/// Designed with the windowed-sinc method and a Blackman window, which gives
/// roughly 74 dB of stopband attenuation with a transition band about
/// `5.5 / taps` (in cycles per sample) wide, centred on the cutoff.
/// The coefficients are symmetric (linear phase) and normalised to unity gain
/// at DC.
#[derive(Debug, Clone)]
pub struct LowPassFir {
    /// Filter coefficients (impulse response)
    fir: Vec<f32>,
}

impl LowPassFir {
    /// Create a new low-pass FIR filter.
    ///
    /// # Arguments
    ///
    /// * `cutoff_freq` - Cutoff (-6 dB) frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `taps` - Number of filter taps (must be > 0). More taps give a
    ///   sharper transition band.
    ///
    /// # Panics
    ///
    /// Panics if `taps` is 0 or if `sample_rate` is 0.
    pub fn new(cutoff_freq: f32, sample_rate: f32, taps: usize) -> Self {
        assert!(taps > 0, "Number of taps must be greater than 0");
        assert!(sample_rate > 0.0, "Sample rate must be greater than 0");

        let norm_cutoff = f64::from(cutoff_freq) / f64::from(sample_rate);
        let mid = (taps - 1) as f64 / 2.0;
        let span = (taps.max(2) - 1) as f64;

        let mut fir: Vec<f64> = (0..taps)
            .map(|n| {
                let x = n as f64 - mid;
                let sinc = if x == 0.0 {
                    2.0 * norm_cutoff
                } else {
                    (2.0 * PI * norm_cutoff * x).sin() / (PI * x)
                };
                // Blackman window
                let window = 0.42 - 0.5 * ((2.0 * PI * n as f64) / span).cos()
                    + 0.08 * ((4.0 * PI * n as f64) / span).cos();
                sinc * window
            })
            .collect();

        // Normalize to unity gain at DC
        let norm: f64 = fir.iter().sum();
        for v in fir.iter_mut() {
            *v /= norm;
        }

        Self {
            fir: fir.into_iter().map(|v| v as f32).collect(),
        }
    }

    /// Get the number of filter taps.
    pub fn taps(&self) -> usize {
        self.fir.len()
    }

    /// Get the filter coefficients.
    pub fn coefficients(&self) -> &[f32] {
        &self.fir
    }

    /// Magnitude response at `freq` Hz for a filter running at `sample_rate`.
    pub fn gain_at(&self, freq: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * f64::from(freq) / f64::from(sample_rate);
        let (re, im) = self
            .fir
            .iter()
            .enumerate()
            .fold((0.0f64, 0.0f64), |(re, im), (n, &h)| {
                let phase = w * n as f64;
                (re + f64::from(h) * phase.cos(), im - f64::from(h) * phase.sin())
            });
        re.hypot(im) as f32
    }
}
