//! Timestamp parsing for callbacks and range filters.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Format used by range filters, interpreted as UTC.
pub const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a timestamp given either as `YYYY-MM-DDTHH:MM:SS` (UTC) or RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, NAIVE_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidInput(format!("invalid timestamp '{}'", value)))
}

/// Parse an optional query value; absent or empty means unbounded.
pub fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_timestamp(v).map(Some),
    }
}
