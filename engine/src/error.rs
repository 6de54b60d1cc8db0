//! Inspection error taxonomy

use crate::provider::ProviderError;
use inspection_shared::Rule;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which snapshot a provider call was fetching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    ClusterConfig,
    ClusterInfo,
    ClusterLoad,
    Metric(String),
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterConfig => f.write_str("cluster_config"),
            Self::ClusterInfo => f.write_str("cluster_info"),
            Self::ClusterLoad => f.write_str("cluster_load"),
            Self::Metric(name) => write!(f, "metrics_schema.{}", name),
        }
    }
}

/// Errors surfaced to the caller of an inspection request.
///
/// Any of these aborts the whole request; no partial finding list is returned.
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("failed to fetch {snapshot} snapshot: {source}")]
    Provider {
        snapshot: SnapshotKind,
        #[source]
        source: ProviderError,
    },

    #[error("inspection cancelled")]
    Cancelled,

    #[error("inspection exceeded its time budget of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("evaluator for rule '{rule}' failed: {message}")]
    Task { rule: Rule, message: String },
}

impl InspectionError {
    pub fn provider(snapshot: SnapshotKind, source: ProviderError) -> Self {
        Self::Provider { snapshot, source }
    }
}

pub type Result<T> = std::result::Result<T, InspectionError>;
