/// Digital Signal Processing (DSP) module.
///
/// Building blocks for turning a high-rate complex stream into the low-rate
/// decimated product.
///
/// # Modules
/// - `filters`: windowed-sinc low-pass FIR design.
/// - `decimator`: stateful multi-stage decimator with minute framing.
///
/// # Traits
/// - [`DspBlock`]: A trait representing a stateful DSP processing block that
///   operates on slices of complex samples. State carries across calls, so
///   feeding a stream in pieces gives the same output as feeding it whole.
use num_complex::Complex;

pub mod decimator;
pub mod filters;

pub trait DspBlock {
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>>;
}
