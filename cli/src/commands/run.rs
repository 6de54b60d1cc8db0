//! Run command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use inspection_engine::{metrics, EngineConfig, InMemoryProvider, InspectionEngine, SnapshotBundle};
use inspection_shared::{utils, Finding, InspectionRequest, Predicates, Rule, TimeRange};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Snapshot file (JSON) holding config, topology, load and metric tables
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only evaluate these rules (repeatable)
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    /// Only report these items (repeatable)
    #[arg(long = "item")]
    pub items: Vec<String>,

    /// Only report these node types (repeatable)
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Only report these instances (repeatable)
    #[arg(long = "instance")]
    pub instances: Vec<String>,

    /// Start of the metric window (YYYY-MM-DD HH:MM:SS)
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// End of the metric window (YYYY-MM-DD HH:MM:SS)
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Evaluate rule categories one after another
    #[arg(long)]
    pub sequential: bool,

    /// Abandon the request after this long (e.g. "500ms", "10s")
    #[arg(long)]
    pub time_budget: Option<String>,

    /// Print engine metrics in Prometheus text format after the findings
    #[arg(long)]
    pub print_metrics: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let bundle = load_snapshot(&args.snapshot)?;
    let config = engine_config(&args)?;
    let request = build_request(&args)?;

    for name in args.rules.iter().filter(|name| name.parse::<Rule>().is_err()) {
        output::warning(&format!("Unknown rule '{}' matches nothing", name));
    }

    info!(
        snapshot = %args.snapshot.display(),
        parallel = config.parallel,
        "Starting inspection"
    );

    let engine = InspectionEngine::new(Arc::new(InMemoryProvider::new(bundle)), config);
    let findings = engine
        .inspect(request)
        .await
        .context("Inspection failed")?;

    print_findings(&findings, args.format)?;

    if args.print_metrics {
        print!("{}", metrics::encode_metrics());
    }

    Ok(())
}

fn load_snapshot(path: &Path) -> Result<SnapshotBundle> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let bundle: SnapshotBundle = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    debug!(
        config_rows = bundle.cluster_config.len(),
        topology_rows = bundle.cluster_info.len(),
        load_rows = bundle.cluster_load.len(),
        series = bundle.metrics.len(),
        "Loaded snapshot"
    );
    Ok(bundle)
}

fn engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if args.sequential {
        config.parallel = false;
    }
    if let Some(budget) = &args.time_budget {
        let budget = utils::parse_duration(budget)
            .with_context(|| format!("Invalid time budget: {}", budget))?;
        config.time_budget_ms = Some(budget.as_millis() as u64);
    }
    Ok(config)
}

fn build_request(args: &RunArgs) -> Result<InspectionRequest> {
    let mut predicates = Predicates::default();
    if !args.rules.is_empty() {
        predicates = predicates.with_rules(args.rules.iter().cloned());
    }
    if !args.items.is_empty() {
        predicates = predicates.with_items(args.items.iter().cloned());
    }
    if !args.types.is_empty() {
        predicates = predicates.with_types(args.types.iter().cloned());
    }
    if !args.instances.is_empty() {
        predicates = predicates.with_instances(args.instances.iter().cloned());
    }

    let mut request = InspectionRequest::new(predicates);
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        request = request.with_time_range(TimeRange::parse(start, end)?);
    }
    Ok(request)
}

fn print_findings(findings: &[Finding], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(findings)
                .context("Failed to serialize findings")?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if findings.is_empty() {
                output::success("No findings");
            } else {
                println!("{}", output::findings_table(findings));
                output::info(&format!("{} finding(s)", findings.len()));
            }
        }
    }
    Ok(())
}
