//! Rule registry
//!
//! The catalog is built once per process and only read afterwards, so parallel
//! evaluators share it without synchronisation.

mod catalog;
mod descriptor;

pub use descriptor::*;

use inspection_shared::{Rule, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

static REGISTRY: Lazy<RuleRegistry> = Lazy::new(RuleRegistry::builtin);

/// The process-wide rule catalog.
pub fn registry() -> &'static RuleRegistry {
    &REGISTRY
}

/// Every rule descriptor, grouped by the evaluator that interprets it.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    pub config_sanity: Vec<ConfigSanityRule>,
    pub load_items: Vec<LoadItem>,
    pub threshold_items: Vec<ThresholdItem>,
    pub error_series: Vec<ErrorSeries>,
    /// Compiled `LIKE` label filters of the threshold items
    like_patterns: HashMap<&'static str, Regex>,
}

/// Uniform, printable view of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDescriptor {
    pub rule: Rule,
    pub item: String,
    /// `None` for items evaluated for every node type.
    pub node_type: Option<String>,
    pub severity: Severity,
    /// Human readable description of the check.
    pub check: String,
}

impl RuleRegistry {
    fn builtin() -> Self {
        let threshold_items = catalog::threshold_items();
        let like_patterns = threshold_items
            .iter()
            .filter_map(|item| match item.filter?.matcher {
                LabelMatch::Like(pattern) => Some(pattern),
                LabelMatch::Equals(_) => None,
            })
            .filter_map(|pattern| match like_regex(pattern) {
                Ok(re) => Some((pattern, re)),
                Err(e) => {
                    tracing::warn!(pattern, "Invalid label pattern: {}", e);
                    None
                }
            })
            .collect();

        Self {
            config_sanity: catalog::config_sanity_rules(),
            load_items: catalog::load_items(),
            threshold_items,
            error_series: catalog::error_series(),
            like_patterns,
        }
    }

    /// Match `value` against a `LIKE` pattern, compiling it only when the
    /// catalog does not already hold it.
    pub fn like(&self, pattern: &str, value: &str) -> bool {
        match self.like_patterns.get(pattern) {
            Some(re) => re.is_match(value),
            None => like_regex(pattern).map_or(false, |re| re.is_match(value)),
        }
    }

    /// Descriptors of every item, in merge order.
    pub fn descriptors(&self) -> Vec<RuleDescriptor> {
        let mut out = vec![
            RuleDescriptor {
                rule: Rule::Config,
                item: "<config key>".to_string(),
                node_type: None,
                severity: Severity::Warning,
                check: "every instance of a node type reports the same value".to_string(),
            },
        ];

        out.extend(self.config_sanity.iter().map(|r| RuleDescriptor {
            rule: Rule::Config,
            item: r.key.to_string(),
            node_type: Some(r.node_type.to_string()),
            severity: r.severity,
            check: format!("value != {}", r.bad_value),
        }));

        out.push(RuleDescriptor {
            rule: Rule::Version,
            item: "git_hash".to_string(),
            node_type: None,
            severity: Severity::Critical,
            check: "one build per node type".to_string(),
        });

        out.extend(self.load_items.iter().map(|i| {
            let reference = match i.reference {
                LoadReference::Fixed { value, .. } => value.to_string(),
                LoadReference::LogicalCores { coefficient } => {
                    format!("cpu_logical_cores * {}", coefficient)
                }
            };
            RuleDescriptor {
                rule: Rule::CurrentLoad,
                item: i.item.to_string(),
                node_type: None,
                severity: Severity::Warning,
                check: format!(
                    "{}/{}/{} {} {}",
                    i.device_category,
                    i.device_name.unwrap_or("*"),
                    i.metric_name,
                    i.comparator.symbol(),
                    reference
                ),
            }
        }));

        out.extend(self.threshold_items.iter().map(|i| RuleDescriptor {
            rule: Rule::ThresholdCheck,
            item: i.item.to_string(),
            node_type: Some(i.node_type.to_string()),
            severity: Severity::Warning,
            check: format!(
                "{:?}({}) {} {}",
                i.aggregation,
                i.series.name,
                i.comparator.symbol(),
                i.reference
            ),
        }));

        out.extend(self.error_series.iter().map(|s| RuleDescriptor {
            rule: Rule::CriticalError,
            item: s.item.to_string(),
            node_type: Some(s.node_type.to_string()),
            severity: Severity::Critical,
            check: format!("increase({}) > 0", s.series.name),
        }));

        out
    }

    pub fn threshold_item(&self, item: &str) -> Option<&ThresholdItem> {
        self.threshold_items.iter().find(|i| i.item == item)
    }
}
