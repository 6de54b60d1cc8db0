//! Global ranking of error-counter increases.

use super::{Inspection, InspectionContext};
use crate::error::Result;
use crate::metrics;
use crate::registry::{registry, ErrorSeries};
use async_trait::async_trait;
use inspection_shared::utils::fixed;
use inspection_shared::{Finding, Rule, SeriesRow, Severity};
use std::collections::BTreeMap;

pub struct CriticalErrorInspection;

#[async_trait]
impl Inspection for CriticalErrorInspection {
    fn rule(&self) -> Rule {
        Rule::CriticalError
    }

    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>> {
        let predicates = ctx.predicates();
        let mut fetched = Vec::new();
        for series in registry()
            .error_series
            .iter()
            .filter(|s| predicates.allows_item(s.item) && predicates.allows_type(s.node_type))
        {
            ctx.check_cancelled()?;
            let rows = ctx.metric(series.series.name).await?;
            fetched.push((*series, rows));
        }

        let (findings, skipped) = rank_errors(&fetched);
        metrics::record_skipped(Rule::CriticalError.name(), skipped);
        Ok(findings)
    }
}

/// Rank every positive counter increase across all series.
///
/// Rows sharing an (instance, label tuple) are summed. The result is ordered
/// by value descending, then item, instance and details ascending. Also
/// returns the number of rows skipped for a wrong label count or a
/// non-finite value.
pub fn rank_errors(series: &[(ErrorSeries, Vec<SeriesRow>)]) -> (Vec<Finding>, usize) {
    let mut skipped = 0;
    let mut ranked: Vec<(f64, Finding)> = Vec::new();

    for (descriptor, rows) in series {
        let mut totals: BTreeMap<(&str, &[String]), f64> = BTreeMap::new();
        for row in rows {
            if row.labels.len() != descriptor.series.arity() || !row.value.is_finite() {
                skipped += 1;
                continue;
            }
            if row.value <= 0.0 {
                continue;
            }
            *totals
                .entry((row.instance.as_str(), row.labels.as_slice()))
                .or_insert(0.0) += row.value;
        }

        for ((instance, labels), total) in totals {
            let value = fixed(total, 2);
            let details = if labels.is_empty() {
                value.clone()
            } else {
                format!("{}({})", value, labels.join(", "))
            };
            ranked.push((
                total,
                Finding {
                    rule: Rule::CriticalError,
                    item: descriptor.item.to_string(),
                    node_type: descriptor.node_type.to_string(),
                    instance: instance.to_string(),
                    value,
                    reference: "0".to_string(),
                    severity: Severity::Critical,
                    details,
                },
            ));
        }
    }

    ranked.sort_by(|(va, a), (vb, b)| {
        vb.total_cmp(va)
            .then_with(|| a.item.cmp(&b.item))
            .then_with(|| a.instance.cmp(&b.instance))
            .then_with(|| a.details.cmp(&b.details))
    });

    (ranked.into_iter().map(|(_, f)| f).collect(), skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 2, 12)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn series(item: &str) -> ErrorSeries {
        *registry()
            .error_series
            .iter()
            .find(|s| s.item == item)
            .unwrap()
    }

    fn rows(values: &[(&str, &[&str], f64)]) -> Vec<SeriesRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, (instance, labels, value))| SeriesRow::new(ts(35 + i as u32), *instance, labels, *value))
            .collect()
    }

    fn fixture() -> Vec<(ErrorSeries, Vec<SeriesRow>)> {
        vec![
            (
                series("critical-error"),
                rows(&[
                    ("tikv-0", &["type1"], 0.0),
                    ("tikv-1", &["type1"], 1.0),
                    ("tikv-2", &["type2"], 5.0),
                ]),
            ),
            (
                series("panic-count"),
                rows(&[("tidb-0", &[], 4.0), ("tidb-0", &[], 0.0), ("tidb-1", &[], 1.0)]),
            ),
            (
                series("binlog-error"),
                rows(&[("tidb-1", &[], 4.0), ("tidb-2", &[], 0.0), ("tidb-3", &[], 1.0)]),
            ),
            (
                series("scheduler-is-busy"),
                rows(&[
                    ("tikv-0", &["db1", "type1", "stage1"], 1.0),
                    ("tikv-0", &["db2", "type1", "stage2"], 2.0),
                    ("tikv-1", &["db1", "type2", "stage1"], 3.0),
                    ("tikv-0", &["db1", "type1", "stage2"], 4.0),
                    ("tikv-0", &["db2", "type1", "stage1"], 5.0),
                    ("tikv-1", &["db1", "type2", "stage2"], 6.0),
                ]),
            ),
            (
                series("coprocessor-is-busy"),
                rows(&[
                    ("tikv-0", &["db1"], 1.0),
                    ("tikv-0", &["db2"], 2.0),
                    ("tikv-1", &["db1"], 3.0),
                    ("tikv-0", &["db1"], 4.0),
                    ("tikv-0", &["db2"], 5.0),
                    ("tikv-1", &["db1"], 6.0),
                ]),
            ),
            (
                series("channel-is-full"),
                rows(&[
                    ("tikv-0", &["db1", "type1"], 1.0),
                    ("tikv-0", &["db2", "type1"], 2.0),
                    ("tikv-1", &["db1", "type2"], 3.0),
                    ("tikv-0", &["db1", "type1"], 4.0),
                    ("tikv-0", &["db2", "type1"], 5.0),
                    ("tikv-1", &["db1", "type2"], 6.0),
                ]),
            ),
            (
                series("tikv_engine_write_stall"),
                rows(&[
                    ("tikv-0", &["kv"], 1.0),
                    ("tikv-0", &["raft"], 2.0),
                    ("tikv-1", &["reason3"], 3.0),
                ]),
            ),
        ]
    }

    #[test]
    fn test_global_rank_across_series() {
        let (findings, skipped) = rank_errors(&fixture());
        assert_eq!(skipped, 0);

        let got: Vec<String> = findings
            .iter()
            .map(|f| format!("{} {} {}", f.item, f.instance, f.details))
            .collect();
        assert_eq!(
            got,
            vec![
                "channel-is-full tikv-1 9.00(db1, type2)",
                "coprocessor-is-busy tikv-1 9.00(db1)",
                "channel-is-full tikv-0 7.00(db2, type1)",
                "coprocessor-is-busy tikv-0 7.00(db2)",
                "scheduler-is-busy tikv-1 6.00(db1, type2, stage2)",
                "channel-is-full tikv-0 5.00(db1, type1)",
                "coprocessor-is-busy tikv-0 5.00(db1)",
                "critical-error tikv-2 5.00(type2)",
                "scheduler-is-busy tikv-0 5.00(db2, type1, stage1)",
                "binlog-error tidb-1 4.00",
                "panic-count tidb-0 4.00",
                "scheduler-is-busy tikv-0 4.00(db1, type1, stage2)",
                "scheduler-is-busy tikv-1 3.00(db1, type2, stage1)",
                "tikv_engine_write_stall tikv-1 3.00(reason3)",
                "scheduler-is-busy tikv-0 2.00(db2, type1, stage2)",
                "tikv_engine_write_stall tikv-0 2.00(raft)",
                "binlog-error tidb-3 1.00",
                "critical-error tikv-1 1.00(type1)",
                "panic-count tidb-1 1.00",
                "scheduler-is-busy tikv-0 1.00(db1, type1, stage1)",
                "tikv_engine_write_stall tikv-0 1.00(kv)",
            ]
        );
    }

    #[test]
    fn test_finding_columns() {
        let (findings, _) = rank_errors(&fixture());
        let top = &findings[0];
        assert_eq!(top.rule, Rule::CriticalError);
        assert_eq!(top.node_type, "tikv");
        assert_eq!(top.value, "9.00");
        assert_eq!(top.reference, "0");
        assert_eq!(top.severity, Severity::Critical);
    }

    #[test]
    fn test_non_positive_and_malformed_rows() {
        let input = vec![(
            series("coprocessor-is-busy"),
            rows(&[
                ("tikv-0", &["db1"], -2.0),
                ("tikv-0", &["db1"], 0.0),
                ("tikv-1", &[], 3.0),
                ("tikv-1", &["db1"], f64::INFINITY),
            ]),
        )];
        let (findings, skipped) = rank_errors(&input);
        assert!(findings.is_empty());
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_rank_ignores_input_order() {
        let mut input = fixture();
        let (forward, _) = rank_errors(&input);
        input.reverse();
        for (_, rows) in input.iter_mut() {
            rows.reverse();
        }
        let (backward, _) = rank_errors(&input);
        assert_eq!(forward, backward);
    }
}
