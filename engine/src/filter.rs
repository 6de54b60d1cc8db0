//! Predicate filtering and result merging

use inspection_shared::{Finding, Predicates, Rule};

/// Rule categories the request can still match, in merge order.
pub fn selected_rules(predicates: &Predicates) -> Vec<Rule> {
    Rule::ALL
        .iter()
        .copied()
        .filter(|rule| predicates.allows_rule(*rule))
        .collect()
}

/// Drop findings failing any predicate, keeping the order of the rest.
pub fn prune(findings: Vec<Finding>, predicates: &Predicates) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| predicates.matches(f))
        .collect()
}

/// Concatenate per-category results in merge order, pruning each.
///
/// Categories may arrive in any order; each category's internal order is kept.
pub fn merge(mut results: Vec<(Rule, Vec<Finding>)>, predicates: &Predicates) -> Vec<Finding> {
    results.sort_by_key(|(rule, _)| *rule);
    results
        .into_iter()
        .flat_map(|(_, findings)| prune(findings, predicates))
        .collect()
}
