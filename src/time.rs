//! Timestamp parsing and the tracking API's literal query format.
//!
//! The API reports instants either as RFC 3339 strings or as bare local
//! date-times, and it matches history query bounds literally against
//! `YYYY-MM-DDTHH:MM:SS`. Bare local values are interpreted in a caller
//! supplied UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Format the API expects for `start_date` / `end_date`.
pub const QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse an upstream timestamp, returning `None` for anything unparseable.
///
/// RFC 3339 values carry their own offset. Bare local values are read in
/// `local_offset`.
///
/// # Example
///
/// ```rust
/// use chrono::FixedOffset;
/// use fleet_tracker::time::parse_timestamp;
///
/// let utc = FixedOffset::east_opt(0).unwrap();
/// assert!(parse_timestamp("2024-05-01T08:00:00Z", utc).is_some());
/// assert!(parse_timestamp("2024-05-01T08:00:00", utc).is_some());
/// assert!(parse_timestamp("yesterday", utc).is_none());
/// ```
pub fn parse_timestamp(raw: &str, local_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| local_offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a local date-time in the literal query format.
///
/// ```rust
/// use chrono::NaiveDate;
/// use fleet_tracker::time::format_query_timestamp;
///
/// let dt = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap().and_hms_opt(4, 5, 6).unwrap();
/// assert_eq!(format_query_timestamp(&dt), "2024-03-07T04:05:06");
/// ```
pub fn format_query_timestamp(local: &NaiveDateTime) -> String {
    local.format(QUERY_FORMAT).to_string()
}

/// Convert an instant into the API's local wall-clock time.
pub fn to_local(instant: DateTime<Utc>, local_offset: FixedOffset) -> NaiveDateTime {
    instant.with_timezone(&local_offset).naive_local()
}

/// Signed minutes from `from` to `to`, with millisecond resolution.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Build a fixed offset from whole hours east of UTC.
pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}
