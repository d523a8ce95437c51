//! Bounds configuration generator
//!
//! Derives the bounds JSON consumed by `boiler-optimizer` from a historical
//! table: each controllable tag gets the supplied rate of change and its
//! observed min/max as global bounds.
//!
//! Usage:
//!   generate-bounds --history outputs/boiler_processed_df.csv \
//!       --controllable "FUEL OIL CONTROL,COMBUSTION AIR CONTROL" \
//!       --rates 0.05,0.1 \
//!       --noncontrollable "FEED WATER TEMP,DRUM PRESSURE" \
//!       --output configs/boiler_bounds.json

use anyhow::{Context, Result};
use boiler_optimizer::config::defaults::TIMESTAMP_COLUMN;
use boiler_optimizer::{BoundsConfig, HistoricalTable};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "generate-bounds")]
#[command(about = "Generate a bounds configuration from historical data")]
#[command(version)]
struct Args {
    /// Historical table (CSV, timestamp-indexed)
    #[arg(long, value_name = "FILE")]
    history: PathBuf,

    /// Controllable tags, in model feature order
    #[arg(long, value_delimiter = ',', required = true)]
    controllable: Vec<String>,

    /// Maximum fractional change per timestep, one per controllable tag
    #[arg(long, value_delimiter = ',', required = true)]
    rates: Vec<f64>,

    /// Noncontrollable (context) tags; tags absent from the history are dropped
    #[arg(long, value_delimiter = ',')]
    noncontrollable: Vec<String>,

    /// Name of the timestamp column
    #[arg(long, default_value = TIMESTAMP_COLUMN)]
    timestamp_column: String,

    /// Where to write the bounds JSON
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
}

fn trimmed(tags: &[String]) -> Vec<String> {
    tags.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let table = HistoricalTable::load(&args.history, &args.timestamp_column)
        .context("Failed to load historical table")?;

    let config = BoundsConfig::generate_from_history(
        &table,
        &trimmed(&args.controllable),
        &args.rates,
        &trimmed(&args.noncontrollable),
    )
    .context("Failed to derive bounds")?;

    info!(
        controllable = config.controllable.len(),
        noncontrollable = config.noncontrollable.len(),
        "Bounds derived from {} rows",
        table.len()
    );
    for var in &config.controllable {
        info!(tag = %var.name, lo = var.lo, hi = var.hi, rate = var.rate, "Controllable");
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    config
        .save_to_file(&args.output)
        .context("Failed to write bounds configuration")?;
    Ok(())
}
