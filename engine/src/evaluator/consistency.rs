//! Configuration and version consistency across instances of a node type.

use super::{Inspection, InspectionContext};
use crate::error::Result;
use crate::registry::{registry, ConfigSanityRule};
use async_trait::async_trait;
use inspection_shared::{
    component_rank, ConfigRow, Finding, Rule, Severity, TopologyRow,
};
use std::collections::{BTreeMap, BTreeSet};

pub struct ConfigInspection;

pub struct VersionInspection;

#[async_trait]
impl Inspection for ConfigInspection {
    fn rule(&self) -> Rule {
        Rule::Config
    }

    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>> {
        let rows = ctx.cluster_config().await?;
        Ok(check_config(&rows, &registry().config_sanity))
    }
}

#[async_trait]
impl Inspection for VersionInspection {
    fn rule(&self) -> Rule {
        Rule::Version
    }

    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>> {
        let rows = ctx.cluster_info().await?;
        Ok(check_versions(&rows))
    }
}

/// Ordering key of a (key, node type) group: key, then component order.
type GroupKey = (String, u8, String);

#[derive(Default)]
struct ConfigGroup {
    values: BTreeSet<String>,
    sanity: Vec<Finding>,
}

/// Flag config keys whose value differs between instances of one node type,
/// plus any instance reporting a value a sanity rule forbids.
///
/// Per (key, node type) the sanity findings come first, ordered by instance,
/// followed by at most one consistency finding.
pub fn check_config(rows: &[ConfigRow], sanity_rules: &[ConfigSanityRule]) -> Vec<Finding> {
    let mut groups: BTreeMap<GroupKey, ConfigGroup> = BTreeMap::new();

    for row in rows {
        let key = (
            row.key.clone(),
            component_rank(&row.node_type),
            row.node_type.clone(),
        );
        let group = groups.entry(key).or_default();
        let value = row.value.trim();
        group.values.insert(value.to_string());

        for rule in sanity_rules {
            if rule.node_type == row.node_type && rule.key == row.key && rule.bad_value == value {
                group.sanity.push(Finding {
                    rule: Rule::Config,
                    item: row.key.clone(),
                    node_type: row.node_type.clone(),
                    instance: row.instance.clone(),
                    value: value.to_string(),
                    reference: format!("not {}", value),
                    severity: rule.severity,
                    details: rule.detail.to_string(),
                });
            }
        }
    }

    let mut findings = Vec::new();
    for ((key, _, node_type), mut group) in groups {
        group.sanity.sort_by(|a, b| a.instance.cmp(&b.instance));
        findings.append(&mut group.sanity);

        if group.values.len() > 1 {
            findings.push(Finding {
                rule: Rule::Config,
                details: format!(
                    "the cluster has different config value of {key}, execute the sql to see more detail: select * from information_schema.cluster_config where type='{node_type}' and `key`='{key}'"
                ),
                item: key,
                node_type,
                instance: String::new(),
                value: "inconsistent".to_string(),
                reference: "consistent".to_string(),
                severity: Severity::Warning,
            });
        }
    }
    findings
}

/// Flag node types whose instances run more than one build.
pub fn check_versions(rows: &[TopologyRow]) -> Vec<Finding> {
    let mut builds: BTreeMap<(u8, String), BTreeSet<&str>> = BTreeMap::new();
    for row in rows {
        builds
            .entry((component_rank(&row.node_type), row.node_type.clone()))
            .or_default()
            .insert(row.build_id.trim());
    }

    builds
        .into_iter()
        .filter(|(_, hashes)| hashes.len() > 1)
        .map(|((_, node_type), hashes)| Finding {
            rule: Rule::Version,
            item: "git_hash".to_string(),
            details: format!(
                "the cluster has {} different {} versions, execute the sql to see more detail: select * from information_schema.cluster_info where type='{}'",
                hashes.len(),
                node_type,
                node_type
            ),
            node_type,
            instance: String::new(),
            value: "inconsistent".to_string(),
            reference: "consistent".to_string(),
            severity: Severity::Critical,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(node_type: &str, instance: &str, key: &str, value: &str) -> ConfigRow {
        ConfigRow {
            node_type: node_type.to_string(),
            instance: instance.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn topology(node_type: &str, instance: &str, build_id: &str) -> TopologyRow {
        TopologyRow {
            node_type: node_type.to_string(),
            instance: instance.to_string(),
            status_address: instance.to_string(),
            version: "4.0".to_string(),
            build_id: build_id.to_string(),
        }
    }

    fn rows(findings: &[Finding]) -> Vec<String> {
        findings
            .iter()
            .map(|f| format!("{} {} {} {}", f.item, f.node_type, f.value, f.reference))
            .collect()
    }

    #[test]
    fn test_single_finding_per_inconsistent_group() {
        let config_rows = vec![
            config("tikv", "192.168.3.32:26600", "coprocessor.high", "8"),
            config("tikv", "192.168.3.33:26600", "coprocessor.high", "8"),
            config("tikv", "192.168.3.34:26600", "coprocessor.high", "7"),
            config("tikv", "192.168.3.35:26600", "coprocessor.high", "7"),
        ];
        let findings = check_config(&config_rows, &registry().config_sanity);

        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.rule, Rule::Config);
        assert_eq!(f.item, "coprocessor.high");
        assert_eq!(f.node_type, "tikv");
        assert_eq!(f.value, "inconsistent");
        assert_eq!(f.reference, "consistent");
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(
            f.details,
            "the cluster has different config value of coprocessor.high, execute the sql to see more detail: select * from information_schema.cluster_config where type='tikv' and `key`='coprocessor.high'"
        );
    }

    #[test]
    fn test_consistent_groups_are_silent() {
        let config_rows = vec![
            config("pd", "192.168.3.32:2379", "scheduler.limit", "3"),
            config("pd", "192.168.3.33:2379", "scheduler.limit", "3"),
            // Same key, different node type: not a peer
            config("tidb", "192.168.3.22:4000", "scheduler.limit", "4"),
        ];
        assert!(check_config(&config_rows, &registry().config_sanity).is_empty());
    }

    #[test]
    fn test_sanity_and_consistency_coexist() {
        let config_rows = vec![
            config("tidb", "192.168.3.25:4000", "log.slow-threshold", "1"),
            config("tidb", "192.168.3.22:4000", "ddl.lease", "1"),
            config("tidb", "192.168.3.23:4000", "ddl.lease", "2"),
            config("tidb", "192.168.3.24:4000", "log.slow-threshold", "0"),
        ];
        let findings = check_config(&config_rows, &registry().config_sanity);

        assert_eq!(
            rows(&findings),
            vec![
                "ddl.lease tidb inconsistent consistent",
                "log.slow-threshold tidb 0 not 0",
                "log.slow-threshold tidb inconsistent consistent",
            ]
        );
        assert_eq!(findings[1].instance, "192.168.3.24:4000");
        assert_eq!(
            findings[1].details,
            "slow-threshold = 0 will record every query to slow log, it may affect performance"
        );
    }

    #[test]
    fn test_sanity_rule_without_disagreement() {
        let config_rows = vec![
            config("tikv", "tikv-0", "raftstore.sync-log", "false"),
            config("tikv", "tikv-1", "raftstore.sync-log", "false"),
        ];
        let findings = check_config(&config_rows, &registry().config_sanity);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].instance, "tikv-0");
        assert_eq!(findings[1].instance, "tikv-1");
        assert!(findings.iter().all(|f| f.reference == "not false"));
    }

    #[test]
    fn test_config_order_ignores_input_order() {
        let mut config_rows = vec![
            config("tidb", "a", "ddl.lease", "1"),
            config("tidb", "b", "ddl.lease", "2"),
            config("tikv", "c", "ddl.lease", "1"),
            config("tikv", "d", "ddl.lease", "3"),
            config("tikv", "c", "coprocessor.high", "8"),
            config("tikv", "d", "coprocessor.high", "7"),
        ];
        let forward = check_config(&config_rows, &[]);
        config_rows.reverse();
        let backward = check_config(&config_rows, &[]);

        assert_eq!(forward, backward);
        assert_eq!(
            rows(&forward),
            vec![
                "coprocessor.high tikv inconsistent consistent",
                "ddl.lease tidb inconsistent consistent",
                "ddl.lease tikv inconsistent consistent",
            ]
        );
    }

    #[test]
    fn test_version_inconsistency() {
        let topology_rows = vec![
            topology("pd", "192.168.1.31:1234", "m234c"),
            topology("tikv", "192.168.1.21:1234", "c234d"),
            topology("tidb", "192.168.1.11:1234", "a234c"),
            topology("tikv", "192.168.1.22:1234", "c234d"),
            topology("pd", "192.168.1.32:1234", "m234d"),
            topology("tidb", "192.168.1.12:1234", "a234d"),
            topology("tidb", "192.168.1.13:1234", "a234e"),
            topology("tikv", "192.168.1.23:1234", "c234e"),
            topology("pd", "192.168.1.33:1234", "m234e"),
        ];
        let findings = check_versions(&topology_rows);

        let types: Vec<&str> = findings.iter().map(|f| f.node_type.as_str()).collect();
        assert_eq!(types, vec!["tidb", "tikv", "pd"]);
        assert!(findings.iter().all(|f| f.severity == Severity::Critical));
        assert_eq!(
            findings[1].details,
            "the cluster has 2 different tikv versions, execute the sql to see more detail: select * from information_schema.cluster_info where type='tikv'"
        );
        assert!(findings[0].details.starts_with("the cluster has 3 different tidb versions"));
    }

    #[test]
    fn test_single_build_is_consistent() {
        let topology_rows = vec![
            topology("tikv", "tikv-0", "c234d"),
            topology("tikv", "tikv-1", "c234d"),
        ];
        assert!(check_versions(&topology_rows).is_empty());
    }
}
