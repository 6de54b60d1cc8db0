//! Inspection findings
//!
//! A [`Finding`] is one output row of the inspection engine. All rule categories
//! produce the same eight-column shape so their output can be merged and
//! presented as a single relation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule category. Declaration order is the merge order of the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rule {
    #[serde(rename = "config")]
    Config,
    #[serde(rename = "version")]
    Version,
    #[serde(rename = "current-load")]
    CurrentLoad,
    #[serde(rename = "threshold-check")]
    ThresholdCheck,
    #[serde(rename = "critical-error")]
    CriticalError,
}

impl Rule {
    /// Every rule, in merge order.
    pub const ALL: [Rule; 5] = [
        Rule::Config,
        Rule::Version,
        Rule::CurrentLoad,
        Rule::ThresholdCheck,
        Rule::CriticalError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Version => "version",
            Self::CurrentLoad => "current-load",
            Self::ThresholdCheck => "threshold-check",
            Self::CriticalError => "critical-error",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::ALL
            .iter()
            .copied()
            .find(|rule| rule.name() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown inspection rule: {}", s))
    }
}

/// One flagged condition.
///
/// `value` and `reference` are already rendered with the display convention of
/// the rule item that produced them; they are compared byte-for-byte by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: Rule,
    pub item: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub instance: String,
    pub value: String,
    pub reference: String,
    pub severity: Severity,
    pub details: String,
}

impl Finding {
    /// Render the row as space separated columns, in relation column order.
    pub fn to_row(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {}",
            self.rule,
            self.item,
            self.node_type,
            self.instance,
            self.value,
            self.reference,
            self.severity,
            self.details
        )
    }
}
