//! Time-related utilities

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

/// Timestamp layout used by time-range hints and snapshot files
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp, with optional fractional seconds.
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .with_context(|| format!("Invalid timestamp '{}', expected YYYY-MM-DD HH:MM:SS", s))
}

/// Render a timestamp in the layout accepted by [`parse_datetime`].
pub fn format_datetime(ts: &NaiveDateTime) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

/// Serde adapter for timestamps stored as `YYYY-MM-DD HH:MM:SS` strings.
pub mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_datetime(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_datetime(&raw).map_err(serde::de::Error::custom)
    }
}
