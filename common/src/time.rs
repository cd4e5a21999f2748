//! Timestamp helpers.
//!
//! All persisted timestamps are UTC, ISO-8601 with a `Z` suffix.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp as `2024-01-01T12:00:00.123456Z`.
pub fn format_timestamp(timestamp: Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp with any offset into UTC.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Age of `timestamp` relative to `reference`.
pub fn age(timestamp: Timestamp, reference: Timestamp) -> Duration {
    reference.signed_duration_since(timestamp)
}
