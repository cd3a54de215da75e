// PathDelta - Path churn and cross-series analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Timestamp parsing and arithmetic.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime};

/// Measurement timestamp. Naive, interpreted as UTC.
pub type Timestamp = NaiveDateTime;

/// Parse `raw` with the first matching format in `formats`.
pub fn parse_timestamp<S: AsRef<str>>(raw: &str, formats: &[S]) -> Result<Timestamp> {
    let raw = raw.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt.as_ref()).ok())
        .ok_or_else(|| Error::malformed(format!("unparseable timestamp '{}'", raw)))
}

/// Signed difference `later - earlier` in seconds (fractional).
pub fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Seconds since the Unix epoch.
pub fn epoch_secs(ts: Timestamp) -> i64 {
    ts.and_utc().timestamp()
}

/// Inverse of [`epoch_secs`].
pub fn from_epoch_secs(secs: i64) -> Option<Timestamp> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}
