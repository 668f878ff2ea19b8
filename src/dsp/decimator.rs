/// Stateful decimator with anti-aliasing filtering.
///
/// This module provides a decimator that reduces the sample rate by a fixed
/// integer ratio known at construction. The ratio is split into a cascade of
/// small stages, each a causal Blackman-windowed sinc low-pass followed by
/// keep-every-Mth downsampling. Every stage keeps its filter history and its
/// decimation phase between calls, so a stream fed one minute at a time comes
/// out exactly as if it had been fed in one piece: no seam, no click, and
/// exactly `len / ratio` outputs for any input whose length is a multiple of
/// the ratio.
///
/// # Example
///
/// ```rust
/// use grape_decimator::dsp::decimator::Decimator;
/// use grape_decimator::dsp::DspBlock;
/// use num_complex::Complex;
///
/// // 2 kHz -> 10 Hz
/// let mut decimator = Decimator::new(2_000, 10).unwrap();
///
/// let minute = vec![Complex::new(1.0f32, 0.0); 2_000 * 60];
/// let output = decimator.process(&minute);
/// assert_eq!(output.len(), 600);
/// ```
use num_complex::Complex;
use tracing::debug;

use super::DspBlock;
use super::filters::LowPassFir;
use crate::error::{Error, Result};

/// Largest factor a single stage is given when the ratio allows it.
const MAX_STAGE_FACTOR: usize = 10;

/// Taps per unit of stage factor; a stage of factor M has `20 * M + 1` taps.
const TAPS_PER_FACTOR: usize = 20;

/// Cutoff as a fraction of the stage's output Nyquist frequency.
const CUTOFF_FRACTION: f32 = 0.8;

/// One filter-and-downsample stage.
///
/// # Fields
/// - `factor`: Decimation factor of this stage
/// - `fir`: Low-pass coefficients
/// - `history`: The last `taps - 1` input samples
/// - `skip`: Input samples still to consume before the next output
#[derive(Debug, Clone)]
pub struct DecimationStage {
    factor: usize,
    fir: Vec<f32>,
    history: Vec<Complex<f32>>,
    skip: usize,
}

impl DecimationStage {
    /// Creates a stage decimating by `factor`.
    ///
    /// # Panics
    /// Panics if `factor` is 0.
    pub fn new(factor: usize) -> Self {
        assert!(factor > 0, "Decimation factor must be greater than 0");

        let taps = TAPS_PER_FACTOR * factor + 1;
        let cutoff = CUTOFF_FRACTION * 0.5 / factor as f32;
        let fir = LowPassFir::new(cutoff, 1.0, taps).coefficients().to_vec();

        Self {
            factor,
            fir,
            history: vec![Complex::new(0.0, 0.0); taps - 1],
            skip: 0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn taps(&self) -> usize {
        self.fir.len()
    }

    /// Zeroes the filter history and realigns the decimation phase.
    pub fn reset(&mut self) {
        self.history.fill(Complex::new(0.0, 0.0));
        self.skip = 0;
    }
}

impl DspBlock for DecimationStage {
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>> {
        if data.is_empty() {
            return Vec::new();
        }

        let taps = self.fir.len();
        let offset = self.history.len();
        let mut buffer = Vec::with_capacity(offset + data.len());
        buffer.extend_from_slice(&self.history);
        buffer.extend_from_slice(data);

        let mut output = Vec::with_capacity(data.len() / self.factor + 1);
        let mut j = self.skip;
        while j < data.len() {
            let newest = offset + j;
            let window = &buffer[newest + 1 - taps..=newest];
            let acc = window
                .iter()
                .zip(self.fir.iter().rev())
                .fold(Complex::new(0.0f32, 0.0), |acc, (x, h)| acc + *x * *h);
            output.push(acc);
            j += self.factor;
        }
        self.skip = j - data.len();

        self.history.clear();
        self.history
            .extend_from_slice(&buffer[buffer.len() - offset..]);

        output
    }
}

/// Split `ratio` into stage factors, largest first.
///
/// Prime factors are packed first-fit-decreasing into stages of at most
/// [`MAX_STAGE_FACTOR`]; a prime larger than that gets a stage of its own.
pub fn stage_factors(ratio: usize) -> Vec<usize> {
    let mut primes = Vec::new();
    let mut n = ratio;
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            primes.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        primes.push(n);
    }
    primes.sort_unstable_by(|a, b| b.cmp(a));

    let mut stages: Vec<usize> = Vec::new();
    for p in primes {
        match stages.iter_mut().find(|s| **s * p <= MAX_STAGE_FACTOR) {
            Some(stage) => *stage *= p,
            None => stages.push(p),
        }
    }
    stages.sort_unstable_by(|a, b| b.cmp(a));
    stages
}

/// Decimator from `input_rate` to `output_rate` for one continuous stream.
///
/// One instance belongs to one channel's run. It must see minutes in
/// ascending order and is simply not called for a missing minute.
#[derive(Debug, Clone)]
pub struct Decimator {
    input_rate: u32,
    output_rate: u32,
    stages: Vec<DecimationStage>,
    max_jitter: usize,
}

impl Decimator {
    /// Creates a decimator for a fixed rate pair.
    ///
    /// # Errors
    /// [`Error::UnsupportedRateRatio`] unless `output_rate` is non-zero and
    /// evenly divides `input_rate`.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || input_rate % output_rate != 0 {
            return Err(Error::UnsupportedRateRatio {
                input_rate,
                output_rate,
            });
        }
        let ratio = (input_rate / output_rate) as usize;
        let stages: Vec<_> = stage_factors(ratio)
            .into_iter()
            .map(DecimationStage::new)
            .collect();
        debug!(
            "Decimator {} Hz -> {} Hz in stages {:?}",
            input_rate,
            output_rate,
            stages.iter().map(|s| s.factor()).collect::<Vec<_>>()
        );
        Ok(Self {
            input_rate,
            output_rate,
            stages,
            max_jitter: input_rate as usize / 100,
        })
    }

    /// Sets how many samples a minute may be short or long and still be
    /// framed to the nominal length by [`Decimator::process_minute`].
    pub fn with_max_jitter(mut self, samples: usize) -> Self {
        self.max_jitter = samples;
        self
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Overall decimation ratio.
    pub fn ratio(&self) -> usize {
        (self.input_rate / self.output_rate) as usize
    }

    pub fn stages(&self) -> &[DecimationStage] {
        &self.stages
    }

    pub fn max_jitter(&self) -> usize {
        self.max_jitter
    }

    /// Input samples in one nominal minute.
    pub fn input_samples_per_minute(&self) -> usize {
        self.input_rate as usize * 60
    }

    /// Output samples produced from one nominal minute.
    pub fn output_samples_per_minute(&self) -> usize {
        self.output_rate as usize * 60
    }

    /// Decimates one minute of samples.
    ///
    /// A minute within `max_jitter` samples of nominal length is framed to
    /// exactly nominal length first: a short minute is extended by repeating
    /// its last sample, a long one loses its tail. Anything further off is
    /// streamed unchanged, so its output length tells the caller it does not
    /// fit a minute slot.
    pub fn process_minute(&mut self, samples: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let Some(&last) = samples.last() else {
            return Vec::new();
        };
        let nominal = self.input_samples_per_minute();
        let len = samples.len();

        if len == nominal {
            return self.process(samples);
        }
        if len.abs_diff(nominal) > self.max_jitter {
            debug!(
                "Minute of {} samples is {} off nominal, not framing",
                len,
                len.abs_diff(nominal)
            );
            return self.process(samples);
        }
        if len > nominal {
            return self.process(&samples[..nominal]);
        }
        let mut framed = Vec::with_capacity(nominal);
        framed.extend_from_slice(samples);
        framed.resize(nominal, last);
        self.process(&framed)
    }

    /// Clears the state of every stage.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

impl DspBlock for Decimator {
    /// Streams samples through every stage.
    ///
    /// Zero-length input returns zero-length output and leaves the state
    /// untouched.
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>> {
        if data.is_empty() {
            return Vec::new();
        }
        let Some((first, rest)) = self.stages.split_first_mut() else {
            return data.to_vec();
        };
        let mut output = first.process(data);
        for stage in rest {
            output = stage.process(&output);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn tone(freq: f32, rate: u32, start: usize, len: usize) -> Vec<Complex<f32>> {
        (start..start + len)
            .map(|n| {
                let phase = 2.0 * PI * freq * (n as f64 / rate as f64) as f32;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    #[test]
    fn test_stage_factors() {
        assert_eq!(stage_factors(2000), vec![10, 10, 10, 2]);
        assert_eq!(stage_factors(2400), vec![10, 10, 6, 4]);
        assert_eq!(stage_factors(1), Vec::<usize>::new());
        assert_eq!(stage_factors(13), vec![13]);
        assert_eq!(stage_factors(26), vec![13, 2]);
        for r in [2, 7, 64, 100, 1000, 4800, 9973] {
            assert_eq!(stage_factors(r).iter().product::<usize>(), r);
        }
    }

    #[test]
    fn test_decimator_new() {
        let dec = Decimator::new(20_000, 10).unwrap();
        assert_eq!(dec.ratio(), 2000);
        assert_eq!(dec.stages().len(), 4);
        assert_eq!(dec.stages()[0].taps(), 201);
        assert_eq!(dec.output_samples_per_minute(), 600);
        assert_eq!(dec.max_jitter(), 200);
    }

    #[test]
    fn test_decimator_rejects_bad_ratio() {
        assert!(matches!(
            Decimator::new(20_001, 10),
            Err(Error::UnsupportedRateRatio { .. })
        ));
        assert!(Decimator::new(20_000, 0).is_err());
        assert!(Decimator::new(0, 10).is_err());
        assert!(Decimator::new(10, 20).is_err());
    }

    #[test]
    #[should_panic(expected = "Decimation factor must be greater than 0")]
    fn test_stage_zero_factor() {
        let _ = DecimationStage::new(0);
    }

    #[test]
    fn test_nominal_minute_length() {
        for (input_rate, output_rate) in [(2_000, 10), (1_200, 10), (600, 20), (48, 8), (10, 10)] {
            let mut dec = Decimator::new(input_rate, output_rate).unwrap();
            let minute = vec![Complex::new(0.5f32, 0.5); input_rate as usize * 60];
            for _ in 0..3 {
                assert_eq!(dec.process(&minute).len(), output_rate as usize * 60);
            }
        }
    }

    #[test]
    fn test_chunked_equals_whole() {
        let input = tone(3.0, 2_000, 0, 2_000 * 60 * 2);

        let mut whole = Decimator::new(2_000, 10).unwrap();
        let expected = whole.process(&input);

        let mut chunked = Decimator::new(2_000, 10).unwrap();
        let mut actual = Vec::new();
        for piece in [&input[..777], &input[777..120_000], &input[120_000..]] {
            actual.extend(chunked.process(piece));
        }
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_empty_input_keeps_state() {
        let input = tone(1.0, 2_000, 0, 5_000);

        let mut a = Decimator::new(2_000, 10).unwrap();
        let mut b = Decimator::new(2_000, 10).unwrap();
        a.process(&input[..2_345]);
        b.process(&input[..2_345]);
        assert!(a.process(&[]).is_empty());
        assert!(a.process_minute(&[]).is_empty());
        assert_eq!(a.process(&input[2_345..]), b.process(&input[2_345..]));
    }

    #[test]
    fn test_decimator_dc_signal() {
        let mut dec = Decimator::new(2_000, 10).unwrap();
        let output = dec.process(&vec![Complex::new(1.0, 0.0); 2_000 * 60]);

        for sample in output.iter().skip(40) {
            assert_relative_eq!(sample.re, 1.0, epsilon = 1e-3);
            assert_relative_eq!(sample.im, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_decimator_rejects_out_of_band() {
        let mut dec = Decimator::new(2_000, 10).unwrap();
        let output = dec.process(&tone(500.0, 2_000, 0, 2_000 * 60));
        for sample in output.iter().skip(40) {
            assert!(sample.norm() < 1e-3, "leak {}", sample.norm());
        }
    }

    #[test]
    fn test_decimator_passes_in_band() {
        let mut dec = Decimator::new(2_000, 10).unwrap();
        let output = dec.process(&tone(1.0, 2_000, 0, 2_000 * 60));
        for sample in output.iter().skip(40) {
            assert_relative_eq!(sample.norm(), 1.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_process_minute_frames_jitter() {
        let nominal = 2_000 * 60;
        let mut dec = Decimator::new(2_000, 10).unwrap();

        let short = vec![Complex::new(1.0f32, 0.0); nominal - 3];
        assert_eq!(dec.process_minute(&short).len(), 600);

        let long = vec![Complex::new(1.0f32, 0.0); nominal + 7];
        assert_eq!(dec.process_minute(&long).len(), 600);

        let exact = vec![Complex::new(1.0f32, 0.0); nominal];
        assert_eq!(dec.process_minute(&exact).len(), 600);
    }

    #[test]
    fn test_process_minute_outside_tolerance() {
        let nominal = 2_000 * 60;
        let mut dec = Decimator::new(2_000, 10).unwrap().with_max_jitter(5);
        let half = vec![Complex::new(1.0f32, 0.0); nominal / 2];
        assert_eq!(dec.process_minute(&half).len(), 300);
        let off = vec![Complex::new(1.0f32, 0.0); nominal - 1_000];
        assert_ne!(dec.process_minute(&off).len(), 600);
    }

    #[test]
    fn test_decimator_reset() {
        let input = tone(1.0, 2_000, 0, 4_000);
        let mut dec = Decimator::new(2_000, 10).unwrap();
        let first = dec.process(&input);
        let _ = dec.process(&input[..1_234]);
        dec.reset();
        assert_eq!(dec.process(&input), first);
    }
}
