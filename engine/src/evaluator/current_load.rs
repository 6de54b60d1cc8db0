//! Live-load checks against fixed or core-derived limits.

use super::{Inspection, InspectionContext};
use crate::error::Result;
use crate::metrics;
use crate::registry::{registry, LoadDetail, LoadItem, LoadReference};
use async_trait::async_trait;
use inspection_shared::{compare_node_types, Finding, LoadRow, Rule, Severity};
use std::collections::HashMap;

const LOGICAL_CORES: &str = "cpu-logical-cores";

pub struct LoadInspection;

#[async_trait]
impl Inspection for LoadInspection {
    fn rule(&self) -> Rule {
        Rule::CurrentLoad
    }

    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>> {
        let rows = ctx.cluster_load().await?;
        let (findings, skipped) = check_load(&rows, &registry().load_items);
        metrics::record_skipped(Rule::CurrentLoad.name(), skipped);
        Ok(findings)
    }
}

fn matches(item: &LoadItem, row: &LoadRow) -> bool {
    row.device_category == item.device_category
        && item.device_name.map_or(true, |name| row.device_name == name)
        && row.metric_name == item.metric_name
}

/// Evaluate every load item against the load rows.
///
/// Returns the findings and the number of rows skipped because their value
/// was not numeric.
pub fn check_load(rows: &[LoadRow], items: &[LoadItem]) -> (Vec<Finding>, usize) {
    // Logical cores per (type, instance)
    let mut cores: HashMap<(&str, &str), f64> = HashMap::new();
    for row in rows.iter().filter(|r| r.metric_name == LOGICAL_CORES) {
        if let Some(count) = row.numeric_value() {
            cores.insert((row.node_type.as_str(), row.instance.as_str()), count);
        }
    }

    let mut skipped = 0;
    let mut flagged: Vec<(&LoadRow, Finding)> = Vec::new();
    for item in items {
        for row in rows.iter().filter(|r| matches(item, r)) {
            let Some(value) = row.numeric_value() else {
                skipped += 1;
                continue;
            };

            let (reference, rendered) = match item.reference {
                LoadReference::Fixed { value, display } => (value, display.to_string()),
                LoadReference::LogicalCores { coefficient } => {
                    match cores.get(&(row.node_type.as_str(), row.instance.as_str())) {
                        Some(count) => {
                            let limit = count * coefficient;
                            (limit, format!("< {:.1}", limit))
                        }
                        None => continue,
                    }
                }
            };

            if !item.comparator.flags(value, reference) {
                continue;
            }

            let details = match item.detail {
                LoadDetail::Empty => String::new(),
                LoadDetail::CpuLoad => format!(
                    "{} should less than (cpu_logical_cores * 0.7)",
                    item.item
                ),
                LoadDetail::DiskUsage => format!(
                    "current disk-usage is too high, execute the sql to see more detail: select * from information_schema.cluster_hardware where type='{}' and instance='{}' and device_type='disk' and device_name='{}'",
                    row.node_type, row.instance, row.device_name
                ),
            };

            flagged.push((
                row,
                Finding {
                    rule: Rule::CurrentLoad,
                    item: item.item.to_string(),
                    node_type: row.node_type.clone(),
                    instance: row.instance.clone(),
                    value: row.value.trim().to_string(),
                    reference: rendered,
                    severity: Severity::Warning,
                    details,
                },
            ));
        }
    }

    flagged.sort_by(|(ra, a), (rb, b)| {
        a.item
            .cmp(&b.item)
            .then_with(|| compare_node_types(&a.node_type, &b.node_type))
            .then_with(|| a.instance.cmp(&b.instance))
            .then_with(|| ra.device_name.cmp(&rb.device_name))
            .then_with(|| a.details.cmp(&b.details))
    });
    flagged.dedup_by(|(_, a), (_, b)| a == b);

    (flagged.into_iter().map(|(_, f)| f).collect(), skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(
        node_type: &str,
        instance: &str,
        category: &str,
        device: &str,
        metric: &str,
        value: &str,
    ) -> LoadRow {
        LoadRow {
            node_type: node_type.to_string(),
            instance: instance.to_string(),
            device_category: category.to_string(),
            device_name: device.to_string(),
            metric_name: metric.to_string(),
            value: value.to_string(),
        }
    }

    fn rows(findings: &[Finding]) -> Vec<String> {
        findings.iter().map(Finding::to_row).collect()
    }

    #[test]
    fn test_fixture_load() {
        let load_rows = vec![
            load("tikv", "tikv-0", "memory", "virtual", "used-percent", "0.8"),
            load("tikv", "tikv-0", "memory", "swap", "used-percent", "0.1"),
            load("tidb", "tidb-0", "memory", "virtual", "used-percent", "0.5"),
            load("tidb", "tidb-0", "memory", "swap", "used-percent", "0"),
            load("pd", "pd-0", "cpu", "cpu", "load1", "1.5"),
            load("pd", "pd-0", "cpu", "cpu", "load5", "0.5"),
            load("pd", "pd-0", "cpu", "cpu", "load15", "1.4"),
            load("pd", "pd-0", "cpu", "cpu", "cpu-logical-cores", "2"),
            load("tikv", "tikv-0", "disk", "sda", "used-percent", "80"),
            load("tikv", "tikv-0", "disk", "sdb", "used-percent", "60"),
        ];
        let (findings, skipped) = check_load(&load_rows, &registry().load_items);

        assert_eq!(skipped, 0);
        assert_eq!(
            rows(&findings),
            vec![
                "current-load cpu-load1 pd pd-0 1.5 < 1.4 warning cpu-load1 should less than (cpu_logical_cores * 0.7)",
                "current-load cpu-load15 pd pd-0 1.4 < 1.4 warning cpu-load15 should less than (cpu_logical_cores * 0.7)",
                "current-load disk-usage tikv tikv-0 80 < 70 warning current disk-usage is too high, execute the sql to see more detail: select * from information_schema.cluster_hardware where type='tikv' and instance='tikv-0' and device_type='disk' and device_name='sda'",
                "current-load swap-memory-usage tikv tikv-0 0.1 0 warning ",
                "current-load virtual-memory-usage tikv tikv-0 0.8 < 0.7 warning ",
            ]
        );
    }

    #[test]
    fn test_cpu_load_boundary_flags_on_equality() {
        let load_rows = vec![
            load("pd", "pd-0", "cpu", "cpu", "cpu-logical-cores", "1"),
            load("pd", "pd-0", "cpu", "cpu", "load1", "0.7"),
            load("pd", "pd-0", "cpu", "cpu", "load5", "0.69"),
        ];
        let (findings, _) = check_load(&load_rows, &registry().load_items);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].item, "cpu-load1");
        assert_eq!(findings[0].reference, "< 0.7");
    }

    #[test]
    fn test_disk_usage_boundary_is_strict() {
        let load_rows = vec![
            load("tikv", "tikv-0", "disk", "sda", "used-percent", "70"),
            load("tikv", "tikv-0", "disk", "sdb", "used-percent", "70.01"),
        ];
        let (findings, _) = check_load(&load_rows, &registry().load_items);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].details.ends_with("device_name='sdb'"));
    }

    #[test]
    fn test_missing_core_count_skips_cpu_items() {
        let load_rows = vec![load("pd", "pd-0", "cpu", "cpu", "load1", "100")];
        let (findings, skipped) = check_load(&load_rows, &registry().load_items);
        assert!(findings.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_core_count_is_per_instance() {
        let load_rows = vec![
            load("pd", "pd-0", "cpu", "cpu", "cpu-logical-cores", "8"),
            load("pd", "pd-1", "cpu", "cpu", "cpu-logical-cores", "1"),
            load("pd", "pd-0", "cpu", "cpu", "load1", "2"),
            load("pd", "pd-1", "cpu", "cpu", "load1", "2"),
        ];
        let (findings, _) = check_load(&load_rows, &registry().load_items);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].instance, "pd-1");
    }

    #[test]
    fn test_non_numeric_rows_are_skipped() {
        let load_rows = vec![
            load("tikv", "tikv-0", "memory", "virtual", "used-percent", "high"),
            load("tikv", "tikv-1", "memory", "virtual", "used-percent", "0.9"),
        ];
        let (findings, skipped) = check_load(&load_rows, &registry().load_items);
        assert_eq!(skipped, 1);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].instance, "tikv-1");
    }
    #[test]
    fn test_node_types_follow_component_order() {
        let load_rows = vec![
            load("tiflash", "tiflash-0", "memory", "virtual", "used-percent", "0.9"),
            load("pd", "pd-0", "memory", "virtual", "used-percent", "0.9"),
            load("alertmanager", "am-0", "memory", "virtual", "used-percent", "0.9"),
            load("tikv", "tikv-0", "memory", "virtual", "used-percent", "0.9"),
            load("tidb", "tidb-0", "memory", "virtual", "used-percent", "0.9"),
        ];
        let (findings, _) = check_load(&load_rows, &registry().load_items);
        let types: Vec<&str> = findings.iter().map(|f| f.node_type.as_str()).collect();
        assert_eq!(types, vec!["tidb", "tikv", "pd", "alertmanager", "tiflash"]);
    }
}
