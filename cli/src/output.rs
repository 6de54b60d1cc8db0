//! Output formatting utilities for CLI commands

use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use inspection_engine::RuleDescriptor;
use inspection_shared::{Finding, Severity};

/// Print success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    eprintln!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

fn header(names: &[&str]) -> Vec<Cell> {
    names.iter().map(|n| Cell::new(n).fg(Color::Cyan)).collect()
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Warning => Color::Yellow,
        Severity::Critical => Color::Red,
    };
    Cell::new(severity).fg(color)
}

/// Create a table of findings, one row per finding in result order
pub fn findings_table(findings: &[Finding]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&[
        "Rule",
        "Item",
        "Type",
        "Instance",
        "Value",
        "Reference",
        "Severity",
        "Details",
    ]));

    for f in findings {
        table.add_row(vec![
            Cell::new(f.rule),
            Cell::new(&f.item),
            Cell::new(&f.node_type),
            Cell::new(&f.instance),
            Cell::new(&f.value),
            Cell::new(&f.reference),
            severity_cell(f.severity),
            Cell::new(&f.details),
        ]);
    }

    table
}

/// Create a table of the rule catalog
pub fn rules_table(descriptors: &[RuleDescriptor]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&["Rule", "Item", "Type", "Severity", "Check"]));

    for d in descriptors {
        table.add_row(vec![
            Cell::new(d.rule),
            Cell::new(&d.item),
            Cell::new(d.node_type.as_deref().unwrap_or("*")),
            severity_cell(d.severity),
            Cell::new(&d.check),
        ]);
    }

    table
}
