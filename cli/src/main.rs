//! CLI for the cluster inspection engine
//!
//! Commands:
//! - run: Evaluate the rule catalog against a snapshot file
//! - rules: List the built-in rule catalog

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "inspection")]
#[command(about = "Cluster inspection - rule-based diagnostics over cluster snapshots", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a cluster snapshot and print the findings
    Run(commands::run::RunArgs),

    /// List the built-in rules
    Rules(commands::rules::RulesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            init_tracing(args.verbose, args.log_json);
            commands::run::run(args).await
        }
        Commands::Rules(args) => commands::rules::run(args),
    };

    if let Err(e) = &result {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    result
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so findings on stdout stay machine readable
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
