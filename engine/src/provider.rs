//! Snapshot providers
//!
//! The engine never talks to the cluster itself. A [`SnapshotProvider`] hands it
//! pre-fetched tables: configuration, topology, load and named metric series
//! already restricted to the requested time window.

use crate::error::SnapshotKind;
use async_trait::async_trait;
use inspection_shared::{ConfigRow, LoadRow, SeriesRow, TimeRange, TopologyRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

/// Failure reported by a snapshot provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

/// Source of request-scoped snapshots. Implementations must be safe to call
/// from several evaluator tasks at once.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Configuration items of every instance.
    async fn cluster_config(&self) -> Result<Vec<ConfigRow>, ProviderError>;

    /// Topology and build information of every instance.
    async fn cluster_info(&self) -> Result<Vec<TopologyRow>, ProviderError>;

    /// Live load and hardware readings of every instance.
    async fn cluster_load(&self) -> Result<Vec<LoadRow>, ProviderError>;

    /// Rows of one named metric series. `range` is the caller's hint, forwarded
    /// verbatim; `None` selects the provider's default window.
    async fn metric(
        &self,
        name: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<SeriesRow>, ProviderError>;
}

/// Every table an in-memory provider can serve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotBundle {
    #[serde(default)]
    pub cluster_config: Vec<ConfigRow>,
    #[serde(default)]
    pub cluster_info: Vec<TopologyRow>,
    #[serde(default)]
    pub cluster_load: Vec<LoadRow>,
    /// Series rows keyed by metric table name
    #[serde(default)]
    pub metrics: BTreeMap<String, Vec<SeriesRow>>,
}

/// One provider call, as recorded by [`InMemoryProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub snapshot: SnapshotKind,
    pub time_range: Option<TimeRange>,
}

/// Provider backed by a static [`SnapshotBundle`].
///
/// Series rows outside the requested window are dropped; unknown metric names
/// yield an empty series. Every call is recorded in the fetch log.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    bundle: SnapshotBundle,
    failing: Option<SnapshotKind>,
    fetches: Mutex<Vec<FetchRecord>>,
}

impl InMemoryProvider {
    pub fn new(bundle: SnapshotBundle) -> Self {
        Self {
            bundle,
            failing: None,
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Make every fetch of `snapshot` fail with [`ProviderError::Unavailable`].
    pub fn with_failure(mut self, snapshot: SnapshotKind) -> Self {
        self.failing = Some(snapshot);
        self
    }

    pub fn bundle(&self) -> &SnapshotBundle {
        &self.bundle
    }

    /// Calls served so far, in arrival order.
    pub fn fetch_log(&self) -> Vec<FetchRecord> {
        match self.fetches.lock() {
            Ok(fetches) => fetches.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, snapshot: SnapshotKind, time_range: Option<TimeRange>) -> Result<(), ProviderError> {
        let failing = self.failing.as_ref() == Some(&snapshot);
        let message = format!("{} is not reachable", snapshot);
        let mut fetches = match self.fetches.lock() {
            Ok(fetches) => fetches,
            Err(poisoned) => poisoned.into_inner(),
        };
        fetches.push(FetchRecord {
            snapshot,
            time_range,
        });
        if failing {
            return Err(ProviderError::Unavailable(message));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotProvider for InMemoryProvider {
    async fn cluster_config(&self) -> Result<Vec<ConfigRow>, ProviderError> {
        self.record(SnapshotKind::ClusterConfig, None)?;
        Ok(self.bundle.cluster_config.clone())
    }

    async fn cluster_info(&self) -> Result<Vec<TopologyRow>, ProviderError> {
        self.record(SnapshotKind::ClusterInfo, None)?;
        Ok(self.bundle.cluster_info.clone())
    }

    async fn cluster_load(&self) -> Result<Vec<LoadRow>, ProviderError> {
        self.record(SnapshotKind::ClusterLoad, None)?;
        Ok(self.bundle.cluster_load.clone())
    }

    async fn metric(
        &self,
        name: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<SeriesRow>, ProviderError> {
        self.record(SnapshotKind::Metric(name.to_string()), range)?;
        let rows = self.bundle.metrics.get(name).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|row| range.map_or(true, |r| r.contains(&row.timestamp)))
            .cloned()
            .collect())
    }
}
