#![doc = include_str!("../readme.md")]

use std::path::PathBuf;

use num_complex::Complex;

pub mod buffer;
pub mod calendar;
pub mod channel;
pub mod codec;
pub mod dsp;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod reader;
pub mod station;

pub use buffer::DailyBuffer;
pub use channel::{Channel, discover_channels};
pub use dsp::decimator::Decimator;
pub use error::{Error, Result};
pub use metadata::{MinuteMetadata, SlotMetadata};
pub use pipeline::{ChannelSummary, DayReport, Pipeline, PipelineConfig};
pub use reader::{RawSegment, RawSegmentReader};

/// Slots in one daily buffer (one per UTC minute)
pub const MINUTES_PER_DAY: usize = 1440;

/// Input rate assumed when no minute of the day declares one
pub const NOMINAL_INPUT_RATE: u32 = 20_000;

/// Output rate of the decimated product
pub const DEFAULT_OUTPUT_RATE: u32 = 10;

/// Bytes per complex sample on disk (little-endian f32 re, f32 im)
pub const BYTES_PER_SAMPLE: usize = 8;

/// Decode interleaved little-endian f32 I/Q pairs.
///
/// Returns `None` when the payload is not a whole number of samples.
pub fn samples_from_bytes(buffer: &[u8]) -> Option<Vec<Complex<f32>>> {
    if buffer.len() % BYTES_PER_SAMPLE != 0 {
        return None;
    }
    Some(
        buffer
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|c| {
                Complex::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect(),
    )
}

/// Encode samples as interleaved little-endian f32 I/Q pairs.
pub fn samples_to_bytes(samples: &[Complex<f32>]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for s in samples {
        buffer.extend_from_slice(&s.re.to_le_bytes());
        buffer.extend_from_slice(&s.im.to_le_bytes());
    }
    buffer
}

/// Expand a leading `~` to the user's home directory.
pub fn expanduser(path: PathBuf) -> PathBuf {
    if let Some(stripped) = path.to_str().and_then(|p| p.strip_prefix("~"))
        && let Some(home_dir) = dirs::home_dir()
    {
        return home_dir.join(stripped.trim_start_matches('/'));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_from_bytes_rejects_partial_sample() {
        assert!(samples_from_bytes(&[0u8; 12]).is_none());
        assert_eq!(samples_from_bytes(&[]).map(|s| s.len()), Some(0));
    }

    #[test]
    fn test_samples_bytes_layout() {
        let samples = vec![Complex::new(0.5f32, -0.25), Complex::new(1.0, 2.0)];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.25f32).to_le_bytes());
        assert_eq!(samples_from_bytes(&bytes), Some(samples));
    }

    #[test]
    fn test_expanduser_leaves_plain_paths() {
        let p = PathBuf::from("/var/lib/grape");
        assert_eq!(expanduser(p.clone()), p);
    }

    #[test]
    fn test_expanduser_with_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanduser(PathBuf::from("~/data")), home.join("data"));
        }
    }
}
