//! Cluster inspection engine
//!
//! Evaluates diagnostic rules over pre-fetched cluster snapshots and produces
//! an ordered list of [`Finding`](inspection_shared::Finding) rows.

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod metrics;
pub mod provider;
pub mod registry;

pub use config::EngineConfig;
pub use engine::InspectionEngine;
pub use error::{InspectionError, Result, SnapshotKind};
pub use provider::{FetchRecord, InMemoryProvider, ProviderError, SnapshotBundle, SnapshotProvider};
pub use registry::{registry, RuleDescriptor, RuleRegistry};
