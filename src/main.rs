//! boiler-optimizer: historical setpoint optimization
//!
//! # Usage
//!
//! ```bash
//! # Trade-off c = 0.5, results to outputs/optimized.csv
//! boiler-optimizer 0.5 outputs/optimized.csv \
//!     --history outputs/boiler_test_df.csv \
//!     --bounds configs/boiler_bounds.json \
//!     --model models/boiler_model.json
//!
//! # Input paths and tuning can come from optimizer.toml instead
//! BOILER_OPT_CONFIG=configs/optimizer.toml boiler-optimizer 0.5 out.csv --workers 8
//! ```
//!
//! # Environment Variables
//!
//! - `BOILER_OPT_CONFIG`: Path to the run config TOML (default: ./optimizer.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use boiler_optimizer::{
    run_optimization, BoundsConfig, HistoricalTable, LinearResponseModel, OptimizerConfig,
    RunOptions, WorkerPool,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "boiler-optimizer")]
#[command(about = "Optimize boiler setpoints for every timestamp of a historical log")]
#[command(version)]
struct CliArgs {
    /// Trade-off weight c on moves away from the last observed setpoints
    c_val: f64,

    /// Where to write the optimized setpoint table (CSV)
    output: PathBuf,

    /// Run config TOML (overrides BOILER_OPT_CONFIG and ./optimizer.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Historical table (CSV, timestamp-indexed)
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Bounds configuration (JSON)
    #[arg(long, value_name = "FILE")]
    bounds: Option<PathBuf>,

    /// Trained response model (JSON)
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Worker pool size, 0 for every available processing unit
    #[arg(short, long)]
    workers: Option<usize>,

    /// Iteration budget per timestamp
    #[arg(long)]
    max_iter: Option<u64>,
}

impl CliArgs {
    /// Command-line values win over anything loaded from file.
    fn apply(&self, config: &mut OptimizerConfig) {
        config.run.trade_off = self.c_val;
        if let Some(w) = self.workers {
            config.run.workers = w;
        }
        if let Some(n) = self.max_iter {
            config.run.max_iter = n;
        }
        if let Some(p) = &self.history {
            config.paths.history = Some(p.clone());
        }
        if let Some(p) = &self.bounds {
            config.paths.bounds = Some(p.clone());
        }
        if let Some(p) = &self.model {
            config.paths.model = Some(p.clone());
        }
    }
}

fn required<'a>(path: Option<&'a Path>, what: &str, flag: &str) -> Result<&'a Path> {
    path.with_context(|| format!("No {what} given: pass --{flag} or set paths.{flag} in the config"))
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let started = Instant::now();

    let mut config = match &args.config {
        Some(path) => OptimizerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OptimizerConfig::load(),
    };
    args.apply(&mut config);
    config
        .validate()
        .context("Invalid settings after applying command-line overrides")?;

    let history_path = required(config.paths.history.as_deref(), "historical table", "history")?;
    let bounds_path = required(config.paths.bounds.as_deref(), "bounds configuration", "bounds")?;
    let model_path = required(config.paths.model.as_deref(), "model", "model")?;

    info!("Loading data");
    let table = HistoricalTable::load(history_path, &config.run.timestamp_column)
        .context("Failed to load historical table")?;
    if table.skipped_rows() > 0 {
        warn!(skipped = table.skipped_rows(), "Some historical rows were unreadable and are not optimized");
    }
    let bounds = BoundsConfig::load_from_file(bounds_path)
        .context("Failed to load bounds configuration")?;
    let model = LinearResponseModel::load_from_file(model_path)
        .context("Failed to load response model")?;

    let pool = WorkerPool::detect(config.run.workers)?;
    let options = RunOptions {
        params: config.run_parameters(),
        solver: config.solver_settings(),
        pool,
        response_column: config.run.response_column.clone(),
    };

    let result = run_optimization(&table, &bounds, Arc::new(model), &options)?;

    info!("Saving results");
    result
        .save_csv(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let summary = result.summary();
    info!(
        rows = summary.total(),
        converged = summary.converged,
        budget_exhausted = summary.budget_exhausted,
        failed = summary.failed,
        output = %args.output.display(),
        "Done"
    );
    info!(
        "Total run time: {:.3} (minutes)",
        started.elapsed().as_secs_f64() / 60.0
    );
    Ok(())
}
