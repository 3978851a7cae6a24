//! Timestamp resolution helpers
//!
//! Timestamps are stored as integer microseconds since the Unix epoch, so
//! every value entering an entity is truncated to that resolution first.

use crate::{Error, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Truncate a timestamp to the stored (microsecond) resolution.
pub fn normalize(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(6)
}

/// The current instant at stored resolution.
pub fn now() -> DateTime<Utc> {
    normalize(Utc::now())
}

pub fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::InvalidData(format!("Timestamp out of range: {}", micros)))
}

/// Format a duration as HH:MM:SS, hours not wrapping at 24.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
