//! Threshold checks
//!
//! Every item is a [`ThresholdItem`] descriptor: the series to read, an
//! optional label filter, an aggregation, a comparator and a reference. This
//! module is the single interpreter for all of them.

use super::{Inspection, InspectionContext};
use crate::error::Result;
use crate::metrics;
use crate::registry::{
    registry, Aggregation, ReferenceSpec, Rendering, ThresholdDetail, ThresholdItem,
};
use async_trait::async_trait;
use inspection_shared::utils::fixed;
use inspection_shared::{ConfigRow, Finding, Rule, SeriesRow, Severity};
use std::collections::{BTreeMap, HashMap};

pub struct ThresholdInspection;

#[async_trait]
impl Inspection for ThresholdInspection {
    fn rule(&self) -> Rule {
        Rule::ThresholdCheck
    }

    async fn inspect(&self, ctx: &InspectionContext) -> Result<Vec<Finding>> {
        let predicates = ctx.predicates();
        let items: Vec<&ThresholdItem> = registry()
            .threshold_items
            .iter()
            .filter(|i| predicates.allows_item(i.item) && predicates.allows_type(i.node_type))
            .collect();
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let needs_config = items
            .iter()
            .any(|i| matches!(i.reference, ReferenceSpec::Config { .. }));
        let config = if needs_config {
            Some(ConfigIndex::new(&ctx.cluster_config().await?))
        } else {
            None
        };

        // Several items read the same series; fetch each once per request.
        let mut series: HashMap<&'static str, Vec<SeriesRow>> = HashMap::new();
        for item in &items {
            ctx.check_cancelled()?;
            let name = item.series.name;
            if !series.contains_key(name) {
                let rows = ctx.metric(name).await?;
                series.insert(name, rows);
            }
        }

        let (findings, skipped) = evaluate_items(&items, &series, config.as_ref());
        metrics::record_skipped(Rule::ThresholdCheck.name(), skipped);
        Ok(findings)
    }
}

/// Evaluate `items` over pre-fetched series, sorted by item then instance.
///
/// Returns the findings and the number of malformed rows, each counted once
/// per series however many items read it.
pub fn evaluate_items(
    items: &[&ThresholdItem],
    series: &HashMap<&'static str, Vec<SeriesRow>>,
    config: Option<&ConfigIndex>,
) -> (Vec<Finding>, usize) {
    let mut skipped_per_series: HashMap<&'static str, usize> = HashMap::new();
    let mut findings = Vec::new();
    for item in items {
        let Some(rows) = series.get(item.series.name) else {
            continue;
        };
        let mut skipped = 0;
        findings.extend(evaluate_item(item, rows, config, &mut skipped));
        let seen = skipped_per_series.entry(item.series.name).or_insert(0);
        *seen = (*seen).max(skipped);
    }

    findings.sort_by(|a, b| {
        a.item
            .cmp(&b.item)
            .then_with(|| a.instance.cmp(&b.instance))
            .then_with(|| a.node_type.cmp(&b.node_type))
    });
    (findings, skipped_per_series.values().sum())
}

/// Configuration values keyed by (node type, instance, key).
#[derive(Debug, Default)]
pub struct ConfigIndex {
    values: HashMap<(String, String, String), String>,
}

impl ConfigIndex {
    pub fn new(rows: &[ConfigRow]) -> Self {
        let values = rows
            .iter()
            .map(|r| {
                (
                    (r.node_type.clone(), r.instance.clone(), r.key.clone()),
                    r.value.trim().to_string(),
                )
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, node_type: &str, instance: &str, key: &str) -> Option<&str> {
        self.values
            .get(&(node_type.to_string(), instance.to_string(), key.to_string()))
            .map(String::as_str)
    }
}

/// Aggregated observation of one item for one instance.
struct Observation {
    instance: String,
    value: f64,
    /// High and low groups of a balance item
    spread: Option<(String, f64, String, f64)>,
}

fn max_by<'a>(
    rows: impl Iterator<Item = (&'a str, f64)>,
    keep: fn(f64, f64) -> bool,
) -> BTreeMap<&'a str, f64> {
    let mut out = BTreeMap::new();
    for (key, value) in rows {
        out.entry(key)
            .and_modify(|current: &mut f64| {
                if keep(value, *current) {
                    *current = value;
                }
            })
            .or_insert(value);
    }
    out
}

fn plain(map: BTreeMap<&str, f64>) -> Vec<Observation> {
    map.into_iter()
        .map(|(instance, value)| Observation {
            instance: instance.to_string(),
            value,
            spread: None,
        })
        .collect()
}

fn aggregate(item: &ThresholdItem, rows: &[(&SeriesRow, f64)]) -> Vec<Observation> {
    let label = |row: &SeriesRow, name: &str| {
        item.series
            .label_index(name)
            .and_then(|i| row.label(i))
            .unwrap_or_default()
            .to_string()
    };
    match item.aggregation {
        Aggregation::Max => plain(max_by(
            rows.iter().map(|(r, v)| (r.instance.as_str(), *v)),
            |new, cur| new > cur,
        )),
        Aggregation::Min => plain(max_by(
            rows.iter().map(|(r, v)| (r.instance.as_str(), *v)),
            |new, cur| new < cur,
        )),
        Aggregation::MaxByLabel { label: name } => {
            let keyed: Vec<(String, f64)> = rows.iter().map(|(r, v)| (label(r, name), *v)).collect();
            plain(max_by(
                keyed.iter().map(|(k, v)| (k.as_str(), *v)),
                |new, cur| new > cur,
            ))
        }
        Aggregation::SumOfMax {
            label: name,
            values,
        } => {
            let mut per_instance: BTreeMap<&str, BTreeMap<String, f64>> = BTreeMap::new();
            for (row, value) in rows {
                let kind = label(row, name);
                if !values.iter().any(|v| *v == kind) {
                    continue;
                }
                let maxima = per_instance.entry(row.instance.as_str()).or_default();
                let slot = maxima.entry(kind).or_insert(*value);
                if *value > *slot {
                    *slot = *value;
                }
            }
            per_instance
                .into_iter()
                .map(|(instance, maxima)| Observation {
                    instance: instance.to_string(),
                    value: maxima.values().sum(),
                    spread: None,
                })
                .collect()
        }
        Aggregation::BalanceGap { label: name } => {
            let keyed: Vec<(String, f64)> = rows.iter().map(|(r, v)| (label(r, name), *v)).collect();
            let groups = max_by(keyed.iter().map(|(k, v)| (k.as_str(), *v)), |new, cur| {
                new > cur
            });
            if groups.len() < 2 {
                return Vec::new();
            }

            let mut high: Option<(&str, f64)> = None;
            let mut low: Option<(&str, f64)> = None;
            for (&key, &value) in &groups {
                if high.map_or(true, |(_, hv)| value > hv) {
                    high = Some((key, value));
                }
                if low.map_or(true, |(_, lv)| value < lv) {
                    low = Some((key, value));
                }
            }
            match (high, low) {
                (Some((hk, hv)), Some((lk, lv))) if hv > 0.0 => vec![Observation {
                    instance: lk.to_string(),
                    value: (hv - lv) / hv * 100.0,
                    spread: Some((hk.to_string(), hv, lk.to_string(), lv)),
                }],
                _ => Vec::new(),
            }
        }
    }
}

/// Resolve the reference of one observation: the numeric limit and, for
/// config-derived limits, the key and raw value that produced it.
fn resolve_reference<'a>(
    item: &ThresholdItem,
    instance: &str,
    config: Option<&'a ConfigIndex>,
) -> (f64, Option<(&'static str, &'a str)>) {
    match item.reference {
        ReferenceSpec::Fixed(value) => (value, None),
        ReferenceSpec::Config { key, coefficient } => {
            let raw = config.and_then(|c| c.get(item.node_type, instance, key));
            match raw.and_then(|r| r.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| (r, v))) {
                Some((raw, size)) => (size * coefficient, Some((key, raw))),
                None => (0.0, None),
            }
        }
    }
}

fn details(item: &ThresholdItem, observation: &Observation) -> String {
    let instance = &observation.instance;
    match item.detail {
        ThresholdDetail::PoolCpu => format!(
            "the '{}' max cpu-usage of {} tikv is too high",
            item.item, instance
        ),
        ThresholdDetail::MaxDuration => format!(
            "max duration of {} {} {} is too slow",
            instance, item.node_type, item.item
        ),
        ThresholdDetail::MinHitRate => {
            format!("min {} rate of {} tikv is too low", item.item, instance)
        }
        ThresholdDetail::PendingCommands => {
            format!("{} tikv scheduler has too many pending commands", instance)
        }
        ThresholdDetail::RegionCount => format!("{} tikv has too many regions", instance),
        ThresholdDetail::RegionHealth => format!(
            "the count of extra-peer and learner-peer and pending-peer are {}, it means the scheduling is too frequent or too slow",
            observation.value
        ),
        ThresholdDetail::Balance { stat } => match &observation.spread {
            Some((high, hv, low, lv)) => format!(
                "{} {} is {:.2}, much more than {} {} {:.2}",
                high, stat, hv, low, stat, lv
            ),
            None => String::new(),
        },
    }
}

/// Evaluate one item over the rows of its series.
///
/// Rows with the wrong label count or a non-finite value are skipped and
/// counted in `skipped`.
pub fn evaluate_item(
    item: &ThresholdItem,
    rows: &[SeriesRow],
    config: Option<&ConfigIndex>,
    skipped: &mut usize,
) -> Vec<Finding> {
    let filter_index = item.filter.and_then(|f| item.series.label_index(f.label));
    let mut selected = Vec::with_capacity(rows.len());
    for row in rows {
        if row.labels.len() != item.series.arity() || !row.value.is_finite() {
            *skipped += 1;
            continue;
        }
        if let (Some(filter), Some(index)) = (item.filter, filter_index) {
            if !row.label(index).map_or(false, |v| filter.matcher.matches(v)) {
                continue;
            }
        }
        selected.push((row, row.value / item.unit_divisor));
    }

    let expectation = item.comparator.expectation();
    aggregate(item, &selected)
        .into_iter()
        .filter_map(|observation| {
            let (reference, resolved) = resolve_reference(item, &observation.instance, config);
            if !item.comparator.flags(observation.value, reference) {
                return None;
            }

            let (value, reference) = match item.rendering {
                Rendering::Decimal {
                    value: vp,
                    reference: rp,
                } => {
                    let mut rendered = format!("{} {}", expectation, fixed(reference, rp));
                    if let Some((key, raw)) = resolved {
                        rendered.push_str(&format!(", config: {}={}", key, raw));
                    }
                    (fixed(observation.value, vp), rendered)
                }
                Rendering::Percent => (
                    format!("{:.2}%", observation.value),
                    format!("{} {:.2}%", expectation, reference),
                ),
            };

            Some(Finding {
                rule: Rule::ThresholdCheck,
                item: item.item.to_string(),
                node_type: item.node_type.to_string(),
                details: details(item, &observation),
                instance: observation.instance,
                value,
                reference,
                severity: Severity::Warning,
            })
        })
        .collect()
}
