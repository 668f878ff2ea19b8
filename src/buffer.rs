//! Daily decimated buffer.
//!
//! One channel-day of decimated output lives in two files under
//! `<data_root>/products/<channel_dir>/decimated/`:
//!
//! - `<YYYYMMDD>.bin`: 1440 fixed-size slots, slot *i* holding minute *i*
//!   after midnight UTC as `samples_per_minute` little-endian f32 I/Q pairs.
//!   Unwritten slots are filled with the quiet-NaN sentinel, which no
//!   accepted write can contain.
//! - `<YYYYMMDD>.json`: the metadata table, one row per slot, with an
//!   explicit `written` flag.
//!
//! A write lands the payload in its slot and syncs it before the table is
//! replaced (temp file + rename), so a run killed between minutes never
//! leaves a slot marked written over a torn payload. Rewriting a slot with
//! the same data leaves both files byte-identical.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use num_complex::Complex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calendar;
use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::metadata::SlotMetadata;
use crate::{BYTES_PER_SAMPLE, MINUTES_PER_DAY};

/// Bit pattern of every float in an unwritten slot (canonical quiet NaN).
pub const SENTINEL_BITS: u32 = 0x7FC0_0000;

/// Paths of buffers currently open for writing in this process.
static OPEN_WRITERS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(Default::default);

/// Holds a buffer path in [`OPEN_WRITERS`] until dropped.
#[derive(Debug)]
struct WriterGuard {
    path: PathBuf,
}

impl WriterGuard {
    fn acquire(path: &Path) -> Result<Self> {
        let mut open = OPEN_WRITERS.lock().unwrap_or_else(|e| e.into_inner());
        if !open.insert(path.to_path_buf()) {
            return Err(Error::BufferBusy(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let mut open = OPEN_WRITERS.lock().unwrap_or_else(|e| e.into_inner());
        open.remove(&self.path);
    }
}

/// On-disk metadata table of one channel-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    pub channel: String,
    pub date: NaiveDate,
    pub sample_rate: u32,
    pub samples_per_minute: usize,
    pub sentinel: String,
    pub minutes: Vec<SlotMetadata>,
}

impl MetadataTable {
    fn new(channel: &Channel, date: NaiveDate, output_rate: u32) -> Self {
        Self {
            channel: channel.name().to_string(),
            date,
            sample_rate: output_rate,
            samples_per_minute: output_rate as usize * 60,
            sentinel: format!("nan:{:#010x}", SENTINEL_BITS),
            minutes: (0..MINUTES_PER_DAY).map(SlotMetadata::unwritten).collect(),
        }
    }

    /// Reads a table from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn matches(&self, expected: &MetadataTable) -> bool {
        self.channel == expected.channel
            && self.date == expected.date
            && self.sample_rate == expected.sample_rate
            && self.samples_per_minute == expected.samples_per_minute
            && self.minutes.len() == MINUTES_PER_DAY
            && self.minutes.iter().enumerate().all(|(i, m)| m.slot == i)
    }

    fn store(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// True if `sample` is the unwritten-slot sentinel.
pub fn is_sentinel(sample: Complex<f32>) -> bool {
    sample.re.to_bits() == SENTINEL_BITS && sample.im.to_bits() == SENTINEL_BITS
}

/// Random-access, minute-indexed store for one channel-day.
///
/// Only one `DailyBuffer` per channel-day can be open in a process at a time.
#[derive(Debug)]
pub struct DailyBuffer {
    channel: Channel,
    date: NaiveDate,
    output_rate: u32,
    data_path: PathBuf,
    meta_path: PathBuf,
    table: MetadataTable,
    file: Option<File>,
    /// Data file must be (re)created before the first write
    needs_init: bool,
    _guard: WriterGuard,
}

impl DailyBuffer {
    /// Opens the buffer of `channel` on `date`.
    ///
    /// Nothing is created on disk until the first successful write. An
    /// existing artifact is reused when its table and size match this
    /// layout; otherwise it is rebuilt from scratch on that first write.
    pub fn open(
        data_root: &Path,
        channel: &Channel,
        date: NaiveDate,
        output_rate: u32,
    ) -> Result<Self> {
        if output_rate == 0 {
            return Err(Error::config("output rate must be non-zero"));
        }
        let dir = channel.products_dir(data_root);
        let stem = calendar::day_dir_name(date);
        let data_path = dir.join(format!("{stem}.bin"));
        let meta_path = dir.join(format!("{stem}.json"));
        let guard = WriterGuard::acquire(&data_path)?;

        let fresh = MetadataTable::new(channel, date, output_rate);
        let expected_len = (MINUTES_PER_DAY * fresh.samples_per_minute * BYTES_PER_SAMPLE) as u64;
        let data_ok = fs::metadata(&data_path).is_ok_and(|m| m.len() == expected_len);

        let (table, needs_init) = match MetadataTable::load(&meta_path) {
            Ok(table) if table.matches(&fresh) && data_ok => (table, false),
            Ok(_) => {
                warn!(
                    "Existing buffer {} does not match layout, rebuilding",
                    data_path.display()
                );
                (fresh, true)
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => (fresh, true),
            Err(e) => {
                warn!("Unreadable table {}: {}, rebuilding", meta_path.display(), e);
                (fresh, true)
            }
        };

        Ok(Self {
            channel: channel.clone(),
            date,
            output_rate,
            data_path,
            meta_path,
            table,
            file: None,
            needs_init,
            _guard: guard,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Samples every written slot must hold.
    pub fn samples_per_minute(&self) -> usize {
        self.table.samples_per_minute
    }

    fn slot_bytes(&self) -> usize {
        self.samples_per_minute() * BYTES_PER_SAMPLE
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.meta_path
    }

    /// Metadata rows, indexed by slot.
    pub fn metadata(&self) -> &[SlotMetadata] {
        &self.table.minutes
    }

    pub fn is_written(&self, slot: usize) -> bool {
        self.table.minutes.get(slot).is_some_and(|m| m.written)
    }

    pub fn written_slots(&self) -> Vec<usize> {
        self.table
            .minutes
            .iter()
            .filter(|m| m.written)
            .map(|m| m.slot)
            .collect()
    }

    /// Stores one minute of decimated output at its slot.
    ///
    /// Returns `false`, leaving the buffer untouched, when `minute_utc` is not
    /// a minute boundary of this buffer's day, when `decimated_iq` does not
    /// hold exactly [`samples_per_minute`](Self::samples_per_minute) finite
    /// samples, or when the write fails on disk. `meta.slot` and
    /// `meta.written` are ignored.
    pub fn write_minute(
        &mut self,
        minute_utc: i64,
        decimated_iq: &[Complex<f32>],
        meta: &SlotMetadata,
    ) -> bool {
        let Some(slot) = calendar::minute_of_day(self.date, minute_utc) else {
            warn!(
                "{}: rejecting minute {} outside {} or not minute-aligned",
                self.channel, minute_utc, self.date
            );
            return false;
        };
        if decimated_iq.len() != self.samples_per_minute() {
            warn!(
                "{}: rejecting slot {}: {} samples, expected {}",
                self.channel,
                slot,
                decimated_iq.len(),
                self.samples_per_minute()
            );
            return false;
        }
        if decimated_iq.iter().any(|s| !s.re.is_finite() || !s.im.is_finite()) {
            warn!("{}: rejecting slot {}: non-finite samples", self.channel, slot);
            return false;
        }

        match self.store_slot(slot, decimated_iq, meta) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: write of slot {} failed: {}", self.channel, slot, e);
                false
            }
        }
    }

    fn store_slot(&mut self, slot: usize, iq: &[Complex<f32>], meta: &SlotMetadata) -> Result<()> {
        let offset = (slot * self.slot_bytes()) as u64;
        let payload = crate::samples_to_bytes(iq);
        let file = self.data_file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&payload)?;
        file.sync_data()?;

        let row = SlotMetadata {
            slot,
            written: true,
            ..meta.clone()
        };
        let previous = std::mem::replace(&mut self.table.minutes[slot], row);
        if let Err(e) = self.table.store(&self.meta_path) {
            self.table.minutes[slot] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Open data file, creating it filled with sentinels first if needed.
    fn data_file(&mut self) -> Result<&mut File> {
        if self.needs_init {
            self.file = None;
            self.create_data_file()?;
            self.table.store(&self.meta_path)?;
            self.needs_init = false;
        }
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new().read(true).write(true).open(&self.data_path)?,
        };
        Ok(self.file.insert(file))
    }

    fn create_data_file(&self) -> Result<()> {
        if let Some(dir) = self.data_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.data_path.with_extension("bin.tmp");
        let sentinel = Complex::new(f32::from_bits(SENTINEL_BITS), f32::from_bits(SENTINEL_BITS));
        let empty_slot = crate::samples_to_bytes(&vec![sentinel; self.samples_per_minute()]);
        {
            let mut file = File::create(&tmp)?;
            for _ in 0..MINUTES_PER_DAY {
                file.write_all(&empty_slot)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.data_path)?;
        debug!("Created {}", self.data_path.display());
        Ok(())
    }

    /// Samples of a written slot; `None` for unwritten or out-of-range slots.
    pub fn read_slot(&self, slot: usize) -> Result<Option<Vec<Complex<f32>>>> {
        if !self.is_written(slot) {
            return Ok(None);
        }
        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start((slot * self.slot_bytes()) as u64))?;
        let mut bytes = vec![0u8; self.slot_bytes()];
        file.read_exact(&mut bytes)?;
        Ok(crate::samples_from_bytes(&bytes))
    }
}
