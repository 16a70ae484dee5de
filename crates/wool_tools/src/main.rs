//! Llama Wool Farm - Development Tools

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wool_core::integrity::{IntegrityConfig, IntegrityEngine};
use wool_core::production::ProductionConfig;
use wool_tools::{offline, validate, Result};

#[derive(Parser)]
#[command(name = "wool-tools")]
#[command(about = "Development tools for Llama Wool Farm")]
struct Cli {
    /// Catalog RON file (defaults to the built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Clock override in Unix milliseconds
    #[arg(long, global = true)]
    now: Option<i64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a save file for corruption
    Validate {
        /// Path to the save file
        path: PathBuf,
    },
    /// Repair a save file
    Repair {
        /// Path to the save file
        path: PathBuf,
        /// Where to write the repaired save (defaults to a dry run)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check catalog consistency
    Catalog {
        /// Print the catalog as RON instead of checking it
        #[arg(long)]
        export: bool,
    },
    /// Estimate offline earnings for a save file
    Offline {
        /// Path to the save file
        path: PathBuf,
        /// Cap on credited hours
        #[arg(long)]
        hours: Option<u32>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Run one command. `Ok(false)` means the input had problems.
fn run(cli: &Cli) -> Result<bool> {
    let now = cli.now.unwrap_or_else(now_ms);
    let catalog = validate::load_catalog(cli.catalog.as_deref())?;
    let engine = IntegrityEngine::new(catalog.clone(), IntegrityConfig::default());

    match &cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating save: {}", path.display());
            let report = validate::check_save(&engine, path, now)?;
            print(cli.json, &report, || validate::describe_report(&report))?;
            Ok(report.is_clean())
        }
        Commands::Repair { path, output } => {
            tracing::info!("Repairing save: {}", path.display());
            let summary = validate::repair_save(&engine, path, output.as_deref(), now)?;
            print(cli.json, &summary, || {
                let mut lines = validate::describe_report(&summary.report);
                lines.push(format!(
                    "{} step(s) applied, {} failed, risk {}, estimated loss {}",
                    summary.applied,
                    summary.failed,
                    summary.plan.risk_level,
                    summary.plan.estimated_data_loss
                ));
                lines.extend(validate::describe_report(&summary.remaining));
                lines
            })?;
            Ok(summary.remaining.is_clean())
        }
        Commands::Catalog { export } => {
            if *export {
                println!("{}", catalog.to_ron()?);
                return Ok(true);
            }
            let report = catalog.validate(now);
            print(cli.json, &report, || validate::describe_report(&report))?;
            Ok(report.is_clean())
        }
        Commands::Offline { path, hours } => {
            let estimate =
                offline::estimate_file(&engine, &ProductionConfig::default(), path, now, *hours)?;
            print(cli.json, &estimate, || {
                let mut lines = vec![format!(
                    "away {} s, credited up to {} h",
                    estimate.elapsed_ms / 1_000,
                    estimate.max_offline_hours
                )];
                lines.extend(
                    estimate
                        .earned
                        .iter()
                        .filter(|(_, amount)| !amount.is_zero())
                        .map(|(tier, amount)| format!("{tier}: {amount}")),
                );
                lines
            })?;
            Ok(true)
        }
    }
}

fn print<T: Serialize>(json: bool, value: &T, lines: impl FnOnce() -> Vec<String>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        for line in lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
