//! Snapshot row definitions
//!
//! These types represent the pre-fetched tables a snapshot provider hands to
//! the inspection engine. Rows are immutable for the lifetime of a request.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Node type of a cluster member (`tidb`, `tikv`, `pd`, ...)
pub type NodeType = String;

/// Instance address (`host:port`)
pub type Instance = String;

/// One configuration item reported by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub instance: Instance,
    pub key: String,
    pub value: String,
}

/// Topology and build information of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRow {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub instance: Instance,
    pub status_address: String,
    pub version: String,
    /// Git hash the binary was built from
    pub build_id: String,
}

/// One live-load or hardware reading of one device.
///
/// `value` is kept as the provider reported it; evaluators parse it and skip
/// rows that are not numeric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRow {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub instance: Instance,
    pub device_category: String,
    pub device_name: String,
    pub metric_name: String,
    pub value: String,
}

impl LoadRow {
    /// Numeric reading, if the reported value parses as a finite number.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

/// One sample of a named metric series.
///
/// The number and meaning of `labels` is fixed per series and described by the
/// rule catalog, never inferred from the rows themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    #[serde(rename = "time", with = "crate::utils::time::datetime_format")]
    pub timestamp: NaiveDateTime,
    pub instance: Instance,
    #[serde(default)]
    pub labels: Vec<String>,
    pub value: f64,
}

impl SeriesRow {
    pub fn new(
        timestamp: NaiveDateTime,
        instance: impl Into<String>,
        labels: &[&str],
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            instance: instance.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }

    /// Label at `index`, if present.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

/// Rank of a node type in component order: tidb, tikv, pd, then everything else.
pub fn component_rank(node_type: &str) -> u8 {
    match node_type {
        "tidb" => 0,
        "tikv" => 1,
        "pd" => 2,
        _ => 3,
    }
}

/// Compare two node types in component order, falling back to name order for
/// types outside the well-known set.
pub fn compare_node_types(a: &str, b: &str) -> Ordering {
    component_rank(a)
        .cmp(&component_rank(b))
        .then_with(|| a.cmp(b))
}
