//! Utility functions and helpers

pub mod time;

use anyhow::Result;

/// Parse a duration string (e.g., "500ms", "30s", "5m")
pub fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();

    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.parse()?;
        Ok(std::time::Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.parse()?;
        Ok(std::time::Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.parse()?;
        Ok(std::time::Duration::from_secs(mins * 60))
    } else {
        // Default to seconds if no suffix
        let secs: u64 = s.parse()?;
        Ok(std::time::Duration::from_secs(secs))
    }
}

/// Render `value` with `precision` decimals.
pub fn fixed(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}
