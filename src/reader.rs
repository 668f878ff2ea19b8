//! Raw Segment Reading Module
//!
//! Reads the per-minute IQ segments the recorder leaves in
//! `<archive>/<YYYYMMDD>/<epoch>.bin[.codec]`, each optionally paired with an
//! `<epoch>.json` sidecar. Nothing that goes wrong with a single minute is an
//! error here: an unreadable, corrupt or truncated segment comes back as
//! absent samples and the caller treats it exactly like a minute that was
//! never recorded.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use num_complex::Complex;
use tracing::{debug, info, warn};

use crate::calendar::{self, SECONDS_PER_DAY};
use crate::channel::Channel;
use crate::codec::{self, CODECS, METADATA_SUFFIX};
use crate::metadata::MinuteMetadata;

/// One minute of raw input as read from the archive.
#[derive(Debug, Clone)]
pub struct RawSegment {
    /// Epoch second the minute starts at
    pub timestamp: i64,
    pub samples: Option<Vec<Complex<f32>>>,
    pub metadata: Option<MinuteMetadata>,
}

impl RawSegment {
    /// True when there are samples to decimate.
    pub fn is_present(&self) -> bool {
        self.samples.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Input rate chosen for one channel-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRate {
    pub rate: u32,
    /// Rate most sidecars of the day declare, if any declare one
    pub declared: Option<u32>,
    /// The declared rate disagreed with the recorded samples and the
    /// nominal rate was taken instead
    pub fallback: bool,
}

/**
 * Reader for one channel's raw archive
 */
#[derive(Debug, Clone)]
pub struct RawSegmentReader {
    channel: Channel,
    archive_dirs: Vec<PathBuf>,
}

impl RawSegmentReader {
    pub fn new(data_root: &Path, channel: Channel) -> Self {
        let archive_dirs = channel.archive_dirs(data_root);
        debug!("Reader for {} over {:?}", channel.name(), archive_dirs);
        Self {
            channel,
            archive_dirs,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Directories read from, in order of preference.
    pub fn archive_dirs(&self) -> &[PathBuf] {
        &self.archive_dirs
    }

    fn day_dirs(&self, date: NaiveDate) -> impl Iterator<Item = PathBuf> + '_ {
        let day = calendar::day_dir_name(date);
        self.archive_dirs.iter().map(move |d| d.join(&day))
    }

    /// Minute timestamps of `date` with at least one segment file, ascending.
    pub fn list_minutes(&self, date: NaiveDate) -> Vec<i64> {
        let start = calendar::day_start(date);
        let mut minutes = BTreeSet::new();
        let mut any_dir = false;
        for day_dir in self.day_dirs(date) {
            let Ok(entries) = fs::read_dir(&day_dir) else {
                continue;
            };
            any_dir = true;
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some((ts, _)) = name.to_str().and_then(codec::match_file_name) else {
                    continue;
                };
                if (start..start + SECONDS_PER_DAY).contains(&ts) {
                    minutes.insert(ts);
                } else {
                    debug!("Ignoring {:?}: outside {}", name, date);
                }
            }
        }
        if !any_dir {
            warn!("No data directory for {} on {}", self.channel.name(), date);
        }
        minutes.into_iter().collect()
    }

    /// Samples and metadata of the minute starting at `timestamp`.
    ///
    /// The first directory with readable samples supplies both; metadata
    /// falls back to any directory holding a sidecar.
    pub fn read_minute(&self, timestamp: i64) -> RawSegment {
        let Some(date) = calendar::date_of(timestamp) else {
            return RawSegment {
                timestamp,
                samples: None,
                metadata: None,
            };
        };
        for day_dir in self.day_dirs(date) {
            if let Some(samples) = read_samples(&day_dir, timestamp) {
                let metadata = read_metadata(&day_dir, timestamp)
                    .or_else(|| self.find_metadata(date, timestamp));
                return RawSegment {
                    timestamp,
                    samples: Some(samples),
                    metadata,
                };
            }
        }
        RawSegment {
            timestamp,
            samples: None,
            metadata: self.find_metadata(date, timestamp),
        }
    }

    fn find_metadata(&self, date: NaiveDate, timestamp: i64) -> Option<MinuteMetadata> {
        self.day_dirs(date)
            .find_map(|day_dir| read_metadata(&day_dir, timestamp))
    }

    /// Input rate for `date`.
    ///
    /// Shorthand for [`resolve_rate`](Self::resolve_rate)`.rate`.
    pub fn sample_rate(&self, date: NaiveDate) -> u32 {
        self.resolve_rate(date).rate
    }

    /// Picks the input rate for `date`.
    ///
    /// The rate declared by most sidecars of the day wins (the lower one on a
    /// tie). It is then checked against the length of the first minute with
    /// samples: more than `rate / 100` samples off a full minute and the
    /// channel's nominal rate is used instead. With no declaration at all the
    /// nominal rate is used.
    pub fn resolve_rate(&self, date: NaiveDate) -> ResolvedRate {
        let nominal = self.channel.nominal_rate();
        let minutes = self.list_minutes(date);

        let mut votes: BTreeMap<u32, usize> = BTreeMap::new();
        for &ts in &minutes {
            if let Some(rate) = self
                .find_metadata(date, ts)
                .and_then(|m| m.declared_rate())
            {
                *votes.entry(rate).or_default() += 1;
            }
        }
        let declared = votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&rate, _)| rate);

        let Some(rate) = declared else {
            debug!(
                "{}: no declared sample rate on {}, assuming {} Hz",
                self.channel.name(),
                date,
                nominal
            );
            return ResolvedRate {
                rate: nominal,
                declared: None,
                fallback: false,
            };
        };
        if votes.len() > 1 {
            warn!(
                "{}: sidecars on {} disagree on sample rate {:?}, taking {} Hz",
                self.channel.name(),
                date,
                votes,
                rate
            );
        }

        let first_len = minutes
            .iter()
            .map(|&ts| self.read_minute(ts))
            .find(RawSegment::is_present)
            .and_then(|seg| seg.samples)
            .map(|s| s.len());
        if let Some(len) = first_len {
            let expected = rate as usize * 60;
            let tolerance = rate as usize / 100;
            if len.abs_diff(expected) > tolerance {
                warn!(
                    "{}: {} Hz declared but first minute holds {} samples, using nominal {} Hz",
                    self.channel.name(),
                    rate,
                    len,
                    nominal
                );
                return ResolvedRate {
                    rate: nominal,
                    declared,
                    fallback: true,
                };
            }
        }
        ResolvedRate {
            rate,
            declared,
            fallback: false,
        }
    }

    /// Every listed minute of `date`, read lazily in ascending order.
    ///
    /// Each call starts a fresh pass over the directories.
    pub fn iterate_day(&self, date: NaiveDate) -> DayIter<'_> {
        let minutes = self.list_minutes(date);
        info!(
            "Found {} minutes for {} in {}",
            minutes.len(),
            date,
            self.channel.name()
        );
        DayIter {
            reader: self,
            minutes: minutes.into_iter(),
        }
    }
}

/// Iterator over one day's segments.
#[derive(Debug)]
pub struct DayIter<'a> {
    reader: &'a RawSegmentReader,
    minutes: std::vec::IntoIter<i64>,
}

impl Iterator for DayIter<'_> {
    type Item = RawSegment;

    fn next(&mut self) -> Option<Self::Item> {
        self.minutes.next().map(|ts| self.reader.read_minute(ts))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.minutes.size_hint()
    }
}

impl ExactSizeIterator for DayIter<'_> {}

fn read_samples(day_dir: &Path, timestamp: i64) -> Option<Vec<Complex<f32>>> {
    for codec in CODECS {
        let path = day_dir.join(format!("{}{}", timestamp, codec.suffix));
        let Ok(bytes) = fs::read(&path) else {
            continue;
        };
        let payload = match (codec.decode)(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Error reading {} ({}): {}", path.display(), codec.name, e);
                continue;
            }
        };
        let Some(samples) = crate::samples_from_bytes(&payload) else {
            warn!(
                "Error reading {}: {} bytes is not a whole number of samples",
                path.display(),
                payload.len()
            );
            continue;
        };
        // NaN or Inf would stay in the filter history for minutes
        if let Some(i) = samples
            .iter()
            .position(|s| !s.re.is_finite() || !s.im.is_finite())
        {
            warn!("Error reading {}: non-finite sample at {}", path.display(), i);
            continue;
        }
        return Some(samples);
    }
    None
}

fn read_metadata(day_dir: &Path, timestamp: i64) -> Option<MinuteMetadata> {
    let path = day_dir.join(format!("{}{}", timestamp, METADATA_SUFFIX));
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("Error reading metadata {}: {}", path.display(), e);
            None
        }
    }
}
