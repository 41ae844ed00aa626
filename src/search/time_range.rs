//! Lenient time bound parsing
//!
//! Bounds arrive as user-supplied strings. Digits are taken as epoch seconds;
//! anything else is tried as an ISO-8601 date or date-time. Values that do not
//! parse produce no bound at all instead of an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::storage::SqlBuilder;

/// Date-time layouts accepted without an explicit offset (read as UTC)
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Date-time layouts carrying an offset, beyond what RFC 3339 covers
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Parse one bound into epoch seconds
///
/// With `end_of_day`, a date-only value resolves to 23:59:59 of that day so
/// that an upper bound covers the whole date.
pub fn parse_epoch(value: Option<&str>, end_of_day: bool) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok();
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let start = if end_of_day {
            date.and_hms_opt(23, 59, 59)?
        } else {
            date.and_hms_opt(0, 0, 0)?
        };
        return Some(start.and_utc().timestamp());
    }

    let normalized = match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        Some(rest) => format!("{}+00:00", rest),
        None => value.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.timestamp());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Some(dt.timestamp());
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp());
        }
    }

    None
}

/// Inclusive epoch bounds for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl TimeRange {
    pub fn from_bounds(since: Option<&str>, until: Option<&str>) -> Self {
        Self {
            since: parse_epoch(since, false),
            until: parse_epoch(until, true),
        }
    }

    /// Add the present bounds on `column` as inclusive conditions
    pub fn push_bounds(&self, builder: &mut SqlBuilder, column: &str) {
        if let Some(since) = self.since {
            builder.at_least(column, since);
        }
        if let Some(until) = self.until {
            builder.at_most(column, until);
        }
    }
}
