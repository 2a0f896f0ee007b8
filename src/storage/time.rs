use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::{Result as AppResult, StorefrontError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamps are stored as RFC3339 UTC strings (`2026-08-07T09:30:00Z`).
pub fn to_utc_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_utc_string(s: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorefrontError::TimeParse(format!("bad timestamp `{}`: {}", s, e)))
}

/// Calendar dates (delivery dates) are stored as `YYYY-MM-DD`, which also
/// makes lexicographic comparison in SQL match date order.
pub fn to_date_string(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date_string(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| StorefrontError::TimeParse(format!("bad date `{}`: {}", s, e)))
}

pub fn parse_opt_utc_string(s: Option<String>) -> AppResult<Option<DateTime<Utc>>> {
    s.map(|v| parse_utc_string(&v)).transpose()
}
