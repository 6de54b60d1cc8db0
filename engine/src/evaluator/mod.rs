//! Category evaluators
//!
//! One evaluator per rule category. Evaluators fetch the snapshots they need
//! through an [`InspectionContext`] and turn them into unfiltered findings.
//! They never depend on each other's output, so the engine may run them
//! concurrently.

mod consistency;
mod critical_error;
mod current_load;
mod threshold;

pub use consistency::{check_config, check_versions, ConfigInspection, VersionInspection};
pub use critical_error::{rank_errors, CriticalErrorInspection};
pub use current_load::{check_load, LoadInspection};
pub use threshold::{evaluate_item, ConfigIndex, ThresholdInspection};

use crate::error::{InspectionError, Result, SnapshotKind};
use crate::provider::{ProviderError, SnapshotProvider};
use async_trait::async_trait;
use inspection_shared::{
    ConfigRow, Finding, InspectionRequest, LoadRow, Predicates, Rule, SeriesRow, TopologyRow,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A rule category evaluator.
#[async_trait]
pub trait Inspection: Send + Sync {
    fn rule(&self) -> Rule;

    /// Produce this category's findings, in the category's own output order.
    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>>;
}

/// Every evaluator, in merge order.
pub static INSPECTIONS: &[&(dyn Inspection)] = &[
    &ConfigInspection,
    &VersionInspection,
    &LoadInspection,
    &ThresholdInspection,
    &CriticalErrorInspection,
];

/// Request-scoped handle evaluators use to reach snapshots.
#[derive(Clone)]
pub struct InspectionContext {
    provider: Arc<dyn SnapshotProvider>,
    request: Arc<InspectionRequest>,
    cancel: CancellationToken,
}

impl InspectionContext {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        request: Arc<InspectionRequest>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            request,
            cancel,
        }
    }

    pub fn predicates(&self) -> &Predicates {
        &self.request.predicates
    }

    /// Fail fast once the request has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InspectionError::Cancelled);
        }
        Ok(())
    }

    /// Cancel the request this context belongs to, stopping sibling evaluators
    /// at their next fetch.
    pub fn cancel_request(&self) {
        self.cancel.cancel();
    }

    async fn fetch<T, F>(&self, snapshot: SnapshotKind, fetch: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InspectionError::Cancelled),
            res = fetch => res.map_err(|e| InspectionError::provider(snapshot, e)),
        }
    }

    pub async fn cluster_config(&self) -> Result<Vec<ConfigRow>> {
        self.fetch(SnapshotKind::ClusterConfig, self.provider.cluster_config())
            .await
    }

    pub async fn cluster_info(&self) -> Result<Vec<TopologyRow>> {
        self.fetch(SnapshotKind::ClusterInfo, self.provider.cluster_info())
            .await
    }

    pub async fn cluster_load(&self) -> Result<Vec<LoadRow>> {
        self.fetch(SnapshotKind::ClusterLoad, self.provider.cluster_load())
            .await
    }

    /// Rows of a metric series, restricted to the request's time range.
    pub async fn metric(&self, name: &str) -> Result<Vec<SeriesRow>> {
        self.fetch(
            SnapshotKind::Metric(name.to_string()),
            self.provider.metric(name, self.request.time_range),
        )
        .await
    }
}
