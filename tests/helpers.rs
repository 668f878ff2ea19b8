//! Test helper utilities for building synthetic raw archives
#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use grape_decimator::calendar;
use num_complex::Complex;

/// On-disk encoding of a raw minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Zstd,
    Lz4,
    Gzip,
}

impl Encoding {
    pub const ALL: [Encoding; 4] = [Encoding::Raw, Encoding::Zstd, Encoding::Lz4, Encoding::Gzip];

    fn suffix(self) -> &'static str {
        match self {
            Encoding::Raw => ".bin",
            Encoding::Zstd => ".bin.zst",
            Encoding::Lz4 => ".bin.lz4",
            Encoding::Gzip => ".bin.gz",
        }
    }

    fn encode(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Encoding::Raw => payload.to_vec(),
            Encoding::Zstd => zstd::stream::encode_all(payload, 3).unwrap(),
            Encoding::Lz4 => {
                let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
                enc.write_all(payload).unwrap();
                enc.finish().unwrap()
            }
            Encoding::Gzip => {
                let mut enc =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(payload).unwrap();
                enc.finish().unwrap()
            }
        }
    }
}

pub fn test_date() -> NaiveDate {
    calendar::parse_date("20251214").unwrap()
}

/// Epoch second of minute `index` of the test day
pub fn minute_ts(index: usize) -> i64 {
    calendar::day_start(test_date()) + 60 * index as i64
}

/// `raw_archive/<channel_dir>/<YYYYMMDD>` for the test day
pub fn day_dir(root: &Path, channel_dir: &str) -> PathBuf {
    root.join("raw_archive")
        .join(channel_dir)
        .join(calendar::day_dir_name(test_date()))
}

/// Sum of complex exponentials `amp * exp(i 2π f t)` over one minute.
///
/// `minute` counts minutes since the start of the stream so consecutive
/// minutes join with continuous phase.
pub fn tones_minute(tones: &[(f64, f64)], sample_rate: u32, minute: usize) -> Vec<Complex<f32>> {
    let len = sample_rate as usize * 60;
    let first = minute * len;
    (first..first + len)
        .map(|n| {
            tones.iter().fold(Complex::new(0.0f32, 0.0), |acc, &(freq, amp)| {
                // Reduce the cycle count before scaling to keep precision
                let cycles = (freq * n as f64 / sample_rate as f64).fract();
                let phase = 2.0 * PI * cycles;
                acc + Complex::new((amp * phase.cos()) as f32, (amp * phase.sin()) as f32)
            })
        })
        .collect()
}

/// `0.5·exp(i2π·10t) + 0.5·exp(i2π·500t)`
pub fn two_tone_minute(sample_rate: u32, minute: usize) -> Vec<Complex<f32>> {
    tones_minute(&[(10.0, 0.5), (500.0, 0.5)], sample_rate, minute)
}

pub fn write_segment(
    root: &Path,
    channel_dir: &str,
    index: usize,
    samples: &[Complex<f32>],
    encoding: Encoding,
) -> PathBuf {
    let dir = day_dir(root, channel_dir);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}{}", minute_ts(index), encoding.suffix()));
    let payload = grape_decimator::samples_to_bytes(samples);
    fs::write(&path, encoding.encode(&payload)).unwrap();
    path
}

pub fn write_sidecar(root: &Path, channel_dir: &str, index: usize, json: serde_json::Value) {
    let dir = day_dir(root, channel_dir);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}.json", minute_ts(index)));
    fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
}

/// Writes minutes `indices` of a tone stream at `sample_rate`, each with a
/// sidecar declaring the rate.
pub fn write_tone_day(
    root: &Path,
    channel_dir: &str,
    tones: &[(f64, f64)],
    sample_rate: u32,
    indices: &[usize],
) {
    for &i in indices {
        write_segment(
            root,
            channel_dir,
            i,
            &tones_minute(tones, sample_rate, i),
            Encoding::Raw,
        );
        write_sidecar(
            root,
            channel_dir,
            i,
            serde_json::json!({ "sample_rate": sample_rate }),
        );
    }
}

/// `products/<channel_dir>/decimated/<YYYYMMDD>.{bin,json}`
pub fn product_paths(root: &Path, channel_dir: &str) -> (PathBuf, PathBuf) {
    let dir = root.join("products").join(channel_dir).join("decimated");
    let stem = calendar::day_dir_name(test_date());
    (dir.join(format!("{stem}.bin")), dir.join(format!("{stem}.json")))
}

/// All samples of one slot straight from a product `.bin`.
pub fn slot_samples(bin: &Path, slot: usize, samples_per_minute: usize) -> Vec<Complex<f32>> {
    let bytes = fs::read(bin).unwrap();
    let slot_bytes = samples_per_minute * grape_decimator::BYTES_PER_SAMPLE;
    grape_decimator::samples_from_bytes(&bytes[slot * slot_bytes..(slot + 1) * slot_bytes])
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tones_minute_length_and_amplitude() {
        let minute = tones_minute(&[(1.0, 1.0)], 100, 0);
        assert_eq!(minute.len(), 6000);
        assert!(minute.iter().all(|s| (s.norm() - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_tones_minute_continuous_across_minutes() {
        let a = tones_minute(&[(3.0, 1.0)], 100, 0);
        let b = tones_minute(&[(3.0, 1.0)], 100, 1);
        let step = b[0] * a[a.len() - 1].conj();
        let expected = 2.0 * PI * 3.0 / 100.0;
        assert!((step.arg() as f64 - expected).abs() < 1e-5);
    }

    #[test]
    fn test_encodings_differ_on_disk() {
        let payload = vec![7u8; 4096];
        let raw = Encoding::Raw.encode(&payload);
        for enc in [Encoding::Zstd, Encoding::Lz4, Encoding::Gzip] {
            assert_ne!(enc.encode(&payload), raw);
        }
    }
}
