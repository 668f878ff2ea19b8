//! Channel descriptors and archive discovery.
//!
//! The recorder stores a channel such as `WWV 10 MHz` in a directory named
//! `WWV_10_MHz`. Older layouts and hand-copied archives also contain the
//! literal spelling, so discovery folds every variant back to one logical
//! name before anything else sees it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::NOMINAL_INPUT_RATE;
use crate::error::Result;
use crate::station::Station;

/// Archive roots under the data root, in order of preference.
pub const ARCHIVE_ROOTS: [&str; 2] = ["raw_archive", "raw_buffer"];

/// One logical recording stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Channel {
    name: String,
    nominal_rate: u32,
}

impl Channel {
    /// Create a channel from a logical name or any of its directory spellings.
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            nominal_rate: NOMINAL_INPUT_RATE,
        }
    }

    /// Override the input rate assumed when no segment declares one.
    pub fn with_nominal_rate(mut self, rate: u32) -> Self {
        self.nominal_rate = rate;
        self
    }

    /// Logical name, e.g. `WWV 10 MHz`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory-name form, e.g. `WWV_10_MHz`.
    pub fn dir_name(&self) -> String {
        self.name.replace(' ', "_")
    }

    pub fn nominal_rate(&self) -> u32 {
        self.nominal_rate
    }

    pub fn station(&self) -> Option<Station> {
        Station::from_channel_name(&self.name)
    }

    /// Every raw segment directory holding this channel.
    ///
    /// A directory belongs to the channel when its name normalizes to the
    /// channel name, so `WWV_10_MHz`, `WWV 10 MHz` and `WWV__10_MHz` all
    /// match. `raw_archive` directories come before `raw_buffer` ones; within
    /// a root the underscore spelling comes first, then the rest by name.
    pub fn archive_dirs(&self, data_root: &Path) -> Vec<PathBuf> {
        let preferred = self.dir_name();
        let mut dirs = Vec::new();
        for root in ARCHIVE_ROOTS {
            let Ok(entries) = fs::read_dir(data_root.join(root)) else {
                continue;
            };
            let mut matching: Vec<PathBuf> = entries
                .flatten()
                .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|n| normalize_name(n) == self.name)
                })
                .map(|e| e.path())
                .collect();
            matching.sort_by_key(|p| {
                let exact = p.file_name().and_then(|n| n.to_str()) == Some(preferred.as_str());
                (!exact, p.clone())
            });
            dirs.extend(matching);
        }
        dirs
    }

    /// Directory holding this channel's decimated daily products.
    pub fn products_dir(&self, data_root: &Path) -> PathBuf {
        data_root
            .join("products")
            .join(self.dir_name())
            .join("decimated")
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Fold a directory spelling back to its logical channel name.
///
/// Underscores become spaces and runs of whitespace collapse to one.
pub fn normalize_name(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// List every channel present under either archive root.
///
/// Missing roots are skipped; the result is sorted and free of spelling
/// duplicates.
pub fn discover_channels(data_root: &Path) -> Result<Vec<Channel>> {
    let mut names = BTreeSet::new();
    for root in ARCHIVE_ROOTS {
        let dir = data_root.join(root);
        if !dir.is_dir() {
            debug!("Archive root {} not present", dir.display());
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(raw) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let name = normalize_name(&raw);
            if !name.is_empty() {
                names.insert(name);
            }
        }
    }
    Ok(names
        .into_iter()
        .map(|name| Channel {
            name,
            nominal_rate: NOMINAL_INPUT_RATE,
        })
        .collect())
}
