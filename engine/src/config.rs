//! Engine configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "INSPECTION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run category evaluators as concurrent tasks
    pub parallel: bool,

    /// Request deadline in milliseconds; unset means no deadline
    pub time_budget_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: std::env::var("INSPECTION_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            time_budget_ms: std::env::var("INSPECTION_TIME_BUDGET_MS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

impl EngineConfig {
    /// Load settings from an optional file (TOML, YAML or JSON, by extension),
    /// then apply `INSPECTION_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read engine configuration")?;
        settings
            .try_deserialize()
            .context("Invalid engine configuration")
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "parallel = false").unwrap();
        writeln!(file, "time_budget_ms = 1500").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.time_budget(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "time_budget_ms = 10").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.parallel, EngineConfig::default().parallel);
        assert_eq!(config.time_budget_ms, Some(10));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = Path::new("/nonexistent/inspection.toml");
        assert!(EngineConfig::load(Some(path)).is_err());
    }
}
