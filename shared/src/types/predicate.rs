//! Request predicates and time ranges
//!
//! Predicates are conjunctive: every column that carries a value set must
//! contain the row's value. An absent set leaves the column unconstrained.

use crate::types::finding::{Finding, Rule};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive time window forwarded to metric series fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "crate::utils::time::datetime_format")]
    pub start: NaiveDateTime,
    #[serde(with = "crate::utils::time::datetime_format")]
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` start/end pair.
    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        let start = crate::utils::time::parse_datetime(start)?;
        let end = crate::utils::time::parse_datetime(end)?;
        if end < start {
            anyhow::bail!("Time range ends before it starts: {} > {}", start, end);
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

/// Caller-supplied membership predicates over the finding columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicates {
    #[serde(default)]
    pub rules: Option<BTreeSet<String>>,
    #[serde(default)]
    pub items: Option<BTreeSet<String>>,
    #[serde(default)]
    pub types: Option<BTreeSet<String>>,
    #[serde(default)]
    pub instances: Option<BTreeSet<String>>,
}

fn to_set<I, S>(values: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Some(values.into_iter().map(Into::into).collect())
}

fn allows(set: &Option<BTreeSet<String>>, value: &str) -> bool {
    set.as_ref().map_or(true, |set| set.contains(value))
}

impl Predicates {
    pub fn with_rules<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules = to_set(values);
        self
    }

    pub fn with_items<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = to_set(values);
        self
    }

    pub fn with_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = to_set(values);
        self
    }

    pub fn with_instances<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instances = to_set(values);
        self
    }

    pub fn allows_rule(&self, rule: Rule) -> bool {
        allows(&self.rules, rule.name())
    }

    pub fn allows_item(&self, item: &str) -> bool {
        allows(&self.items, item)
    }

    pub fn allows_type(&self, node_type: &str) -> bool {
        allows(&self.types, node_type)
    }

    pub fn allows_instance(&self, instance: &str) -> bool {
        allows(&self.instances, instance)
    }

    /// Whether a finished finding passes every predicate.
    pub fn matches(&self, finding: &Finding) -> bool {
        self.allows_rule(finding.rule)
            && self.allows_item(&finding.item)
            && self.allows_type(&finding.node_type)
            && self.allows_instance(&finding.instance)
    }
}

/// One inspection request as handed over by the query front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRequest {
    /// `None` means the provider's default window.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub predicates: Predicates,
}

impl InspectionRequest {
    pub fn new(predicates: Predicates) -> Self {
        Self {
            time_range: None,
            predicates,
        }
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }
}
