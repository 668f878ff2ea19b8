//! Per-minute metadata.
//!
//! [`MinuteMetadata`] is what the recorder writes next to each raw segment.
//! [`SlotMetadata`] is the row the daily buffer keeps for each minute slot.

use serde::{Deserialize, Serialize};

/// Clock uncertainty reported when the recorder supplied none.
pub const UNKNOWN_UNCERTAINTY_MS: f64 = 999.9;

/// Quality grade reported when the recorder supplied none.
pub const UNKNOWN_GRADE: char = 'X';

/// Sidecar metadata of one raw minute. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct MinuteMetadata {
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default, alias = "clock_offset_ms")]
    pub d_clock_ms: Option<f64>,
    #[serde(default, alias = "clock_uncertainty_ms")]
    pub uncertainty_ms: Option<f64>,
    #[serde(default, alias = "grade")]
    pub quality_grade: Option<String>,
    #[serde(default)]
    pub gap_samples: Option<u64>,
}

impl MinuteMetadata {
    /// Declared input rate, if present and usable as an integer rate.
    pub fn declared_rate(&self) -> Option<u32> {
        self.sample_rate
            .filter(|r| r.is_finite() && *r >= 1.0 && *r <= u32::MAX as f64)
            .map(|r| r.round() as u32)
    }

    pub fn gap_samples(&self) -> u64 {
        self.gap_samples.unwrap_or(0)
    }
}

/// One row of the daily metadata table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SlotMetadata {
    pub slot: usize,
    pub written: bool,
    pub d_clock_ms: f64,
    pub uncertainty_ms: f64,
    pub quality_grade: char,
    pub gap_samples: u64,
    /// First written minute after one or more minutes with no data; phase
    /// continuity with the previous written slot is not guaranteed.
    pub follows_gap: bool,
}

impl SlotMetadata {
    /// Row for a slot that has never been written.
    pub fn unwritten(slot: usize) -> Self {
        Self {
            slot,
            written: false,
            d_clock_ms: 0.0,
            uncertainty_ms: UNKNOWN_UNCERTAINTY_MS,
            quality_grade: UNKNOWN_GRADE,
            gap_samples: 0,
            follows_gap: false,
        }
    }

    /// Row echoing a raw minute's metadata, with the defaults the recorder
    /// implies when the sidecar or a field is missing.
    pub fn from_minute(meta: Option<&MinuteMetadata>) -> Self {
        let mut row = Self::unwritten(0);
        if let Some(m) = meta {
            row.d_clock_ms = m.d_clock_ms.unwrap_or(0.0);
            row.uncertainty_ms = m.uncertainty_ms.unwrap_or(UNKNOWN_UNCERTAINTY_MS);
            row.quality_grade = m
                .quality_grade
                .as_deref()
                .and_then(|g| g.chars().next())
                .unwrap_or(UNKNOWN_GRADE);
            row.gap_samples = m.gap_samples();
        }
        row
    }
}
