//! Timestamp helpers for the database layer.
//!
//! We store timestamps as RFC 3339 `TEXT` (UTC) in SQLite.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 string (UTC, millisecond precision).
#[inline]
pub fn now_rfc3339() -> String {
    datetime_to_rfc3339(Utc::now())
}

/// Convert a `DateTime<Utc>` to the stored RFC 3339 encoding.
#[inline]
pub fn datetime_to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored RFC 3339 string back to `DateTime<Utc>`.
///
/// Returns `None` for malformed values instead of panicking; callers decide
/// whether a missing timestamp is an error.
#[inline]
pub fn rfc3339_to_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
