//! Rule descriptor types
//!
//! Descriptors are plain data: each names the series it reads, how rows are
//! aggregated, which comparator flags a finding and where the reference comes
//! from. Evaluators interpret them; adding a rule never needs a new code path.

use inspection_shared::Severity;
use regex::Regex;
use std::fmt;

/// Relative distance below which a value is treated as equal to its reference.
pub const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Comparison that flags a finding when `value <op> reference` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    /// Values within a relative [`BOUNDARY_TOLERANCE`] of the reference count
    /// as equal to it, so derived values such as percentage gaps keep exact
    /// boundary semantics.
    pub fn flags(&self, value: f64, reference: f64) -> bool {
        let tolerance = BOUNDARY_TOLERANCE * reference.abs().max(1.0);
        let at_reference = (value - reference).abs() <= tolerance;
        match self {
            Self::Gt => value > reference && !at_reference,
            Self::Gte => value >= reference || at_reference,
            Self::Lt => value < reference && !at_reference,
            Self::Lte => value <= reference || at_reference,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Relation a healthy value keeps with its reference, as shown in the
    /// reference column.
    pub fn expectation(&self) -> &'static str {
        match self {
            Self::Gt | Self::Gte => "<",
            Self::Lt | Self::Lte => ">",
        }
    }
}

/// Where a threshold comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceSpec {
    Fixed(f64),
    /// Configured value of `key` on the same instance, scaled by `coefficient`.
    /// Falls back to 0 when the key is not reported.
    Config {
        key: &'static str,
        coefficient: f64,
    },
}

/// A named metric series and the fixed meaning of its label columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSeries {
    pub name: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricSeries {
    pub const fn new(name: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, labels }
    }

    pub fn arity(&self) -> usize {
        self.labels.len()
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| *l == label)
    }
}

/// How a label value is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMatch {
    Equals(&'static str),
    /// SQL `LIKE` pattern: `%` matches any run, `_` any single character.
    Like(&'static str),
}

impl LabelMatch {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == *expected,
            Self::Like(pattern) => super::registry().like(pattern, value),
        }
    }
}

/// Row filter on one label column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelFilter {
    pub label: &'static str,
    pub matcher: LabelMatch,
}

impl LabelFilter {
    pub const fn equals(label: &'static str, value: &'static str) -> Self {
        Self {
            label,
            matcher: LabelMatch::Equals(value),
        }
    }

    pub const fn like(label: &'static str, pattern: &'static str) -> Self {
        Self {
            label,
            matcher: LabelMatch::Like(pattern),
        }
    }
}

/// Aggregation applied to the rows of one threshold-check item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Largest value per instance.
    Max,
    /// Smallest value per instance.
    Min,
    /// Largest value per value of `label`; the label value becomes the instance.
    MaxByLabel { label: &'static str },
    /// Per instance, the sum of the largest value seen for each of `values` of `label`.
    SumOfMax {
        label: &'static str,
        values: &'static [&'static str],
    },
    /// Percentage gap between the highest and lowest per-`label` maximum,
    /// reported against the lowest.
    BalanceGap { label: &'static str },
}

/// Display convention of value and reference columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    Decimal { value: usize, reference: usize },
    /// Two decimals with a `%` suffix on both columns.
    Percent,
}

/// Details sentence of a threshold-check finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdDetail {
    PoolCpu,
    MaxDuration,
    MinHitRate,
    PendingCommands,
    RegionCount,
    RegionHealth,
    Balance { stat: &'static str },
}

/// One threshold-check item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdItem {
    pub item: &'static str,
    pub node_type: &'static str,
    pub series: MetricSeries,
    pub filter: Option<LabelFilter>,
    pub aggregation: Aggregation,
    /// Observed values are divided by this before comparison (1e6 for µs series).
    pub unit_divisor: f64,
    pub comparator: Comparator,
    pub reference: ReferenceSpec,
    pub rendering: Rendering,
    pub detail: ThresholdDetail,
}

/// Reference of a current-load item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadReference {
    Fixed { value: f64, display: &'static str },
    /// Logical core count of the same instance times `coefficient`.
    LogicalCores { coefficient: f64 },
}

/// Details sentence of a current-load finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDetail {
    Empty,
    CpuLoad,
    DiskUsage,
}

/// One current-load item, matched against load rows by device and metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadItem {
    pub item: &'static str,
    pub device_category: &'static str,
    /// `None` matches every device of the category.
    pub device_name: Option<&'static str>,
    pub metric_name: &'static str,
    pub comparator: Comparator,
    pub reference: LoadReference,
    pub detail: LoadDetail,
}

/// A configuration value that is wrong regardless of what peers report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSanityRule {
    pub node_type: &'static str,
    pub key: &'static str,
    pub bad_value: &'static str,
    pub severity: Severity,
    pub detail: &'static str,
}

/// A counter-increase series ranked by the critical-error rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSeries {
    pub item: &'static str,
    pub node_type: &'static str,
    pub series: MetricSeries,
}

/// Compile a SQL `LIKE` pattern (no escapes) into an anchored regex.
pub fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("(?s)^");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

impl fmt::Display for ReferenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{}", value),
            Self::Config { key, coefficient } => write!(f, "{} * {}", key, coefficient),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_boundaries() {
        assert!(!Comparator::Gt.flags(5.0, 5.0));
        assert!(Comparator::Gt.flags(5.01, 5.0));
        assert!(Comparator::Gte.flags(5.0, 5.0));
        assert!(!Comparator::Gte.flags(4.99, 5.0));
        assert!(!Comparator::Lt.flags(0.95, 0.95));
        assert!(Comparator::Lt.flags(0.94, 0.95));
        assert!(Comparator::Lte.flags(0.95, 0.95));
    }

    #[test]
    fn test_comparator_absorbs_rounding_at_reference() {
        let gap = (0.7 - 0.665) / 0.7 * 100.0;
        assert!(Comparator::Gte.flags(gap, 5.0));
        assert!(!Comparator::Gt.flags(0.1 + 0.2, 0.3));
        assert!(!Comparator::Lt.flags(0.3, 0.1 + 0.2));
        assert!(Comparator::Gte.flags(19.999_999_999_999_996, 20.0));
        assert!(!Comparator::Gte.flags(4.999, 5.0));
    }

    #[test]
    fn test_comparator_expectation() {
        assert_eq!(Comparator::Gt.expectation(), "<");
        assert_eq!(Comparator::Gte.expectation(), "<");
        assert_eq!(Comparator::Lt.expectation(), ">");
        assert_eq!(Comparator::Gte.symbol(), ">=");
    }

    fn like(pattern: &str, text: &str) -> bool {
        like_regex(pattern).unwrap().is_match(text)
    }

    #[test]
    fn test_like() {
        assert!(like("cop_normal%", "cop_normal0"));
        assert!(like("grpc%", "grpc"));
        assert!(like("raftstore_%", "raftstore_1"));
        assert!(!like("raftstore_%", "raftstore"));
        assert!(like("split_check", "split_check"));
        assert!(!like("split_check", "split_check_1"));
        assert!(like("%read%", "store_read_norm1"));
        assert!(like("a%b%c", "axxbyyc"));
        assert!(!like("a%b%c", "axxbyy"));
        assert!(!like("apply_%", "store_read_high2"));
        assert!(like("cop.x%", "cop.x1"));
        assert!(!like("cop.x%", "copyx1"));
        assert!(!like("grpc%", "xgrpc"));
    }

    #[test]
    fn test_series_label_index() {
        let series = MetricSeries::new("pd_scheduler_store_status", &["address", "store", "type"]);
        assert_eq!(series.arity(), 3);
        assert_eq!(series.label_index("type"), Some(2));
        assert_eq!(series.label_index("db"), None);
    }
}
