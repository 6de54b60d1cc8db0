//! Rules command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use inspection_engine::{registry, RuleDescriptor};

#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Only list items of these rules (repeatable)
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    /// Print the catalog as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RulesArgs) -> Result<()> {
    let descriptors = select(registry().descriptors(), &args.rules);

    if args.json {
        let json =
            serde_json::to_string_pretty(&descriptors).context("Failed to serialize catalog")?;
        println!("{}", json);
        return Ok(());
    }

    if descriptors.is_empty() {
        output::warning("No rules match the given filter");
        return Ok(());
    }

    println!("{}", output::rules_table(&descriptors));
    Ok(())
}

fn select(descriptors: Vec<RuleDescriptor>, rules: &[String]) -> Vec<RuleDescriptor> {
    if rules.is_empty() {
        return descriptors;
    }
    descriptors
        .into_iter()
        .filter(|d| rules.iter().any(|r| r == d.rule.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspection_shared::Rule;

    #[test]
    fn test_no_filter_lists_every_rule() {
        let all = select(registry().descriptors(), &[]);
        for rule in Rule::ALL {
            assert!(all.iter().any(|d| d.rule == rule), "missing {}", rule);
        }
    }

    #[test]
    fn test_filter_by_rule() {
        let only = select(
            registry().descriptors(),
            &["critical-error".to_string()],
        );
        assert!(!only.is_empty());
        assert!(only.iter().all(|d| d.rule == Rule::CriticalError));

        assert!(select(registry().descriptors(), &["cpu".to_string()]).is_empty());
    }
}
