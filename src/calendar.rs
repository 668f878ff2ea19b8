//! UTC day and minute arithmetic.
//!
//! Raw segments are named by the epoch second their minute starts at, and the
//! daily buffer is indexed by minute-of-day. Everything here is UTC.

use chrono::{DateTime, NaiveDate, Utc};

use crate::MINUTES_PER_DAY;
use crate::error::{Error, Result};

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_DAY: i64 = SECONDS_PER_MINUTE * MINUTES_PER_DAY as i64;

/// Parse a date given as `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    let fmt = if s.contains('-') { "%Y-%m-%d" } else { "%Y%m%d" };
    NaiveDate::parse_from_str(s, fmt).map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Directory name of a day in the raw archive (`YYYYMMDD`).
pub fn day_dir_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Epoch seconds of 00:00:00 UTC on `date`.
pub fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// UTC date containing the epoch second `ts`.
pub fn date_of(ts: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

/// Minute index after midnight, if `ts` is minute-aligned and inside `date`.
pub fn minute_of_day(date: NaiveDate, ts: i64) -> Option<usize> {
    if ts.rem_euclid(SECONDS_PER_MINUTE) != 0 {
        return None;
    }
    let offset = ts - day_start(date);
    if !(0..SECONDS_PER_DAY).contains(&offset) {
        return None;
    }
    Some((offset / SECONDS_PER_MINUTE) as usize)
}

/// Today's date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
