//! Boiler setpoint optimizer
//!
//! Replays a historical operating log and, for every timestamp, searches
//! for the controllable setpoints a trained response model predicts to be
//! best, within a rate-of-change window around the last observed values.
//!
//! ## Architecture
//!
//! - **History**: timestamp-indexed CSV loader
//! - **Model**: `ResponseModel` seam plus a JSON linear/quadratic model
//! - **Optimization**: bounds engine, objective, subproblem builder,
//!   bounded Nelder-Mead, worker pool scheduler, ordered aggregation
//! - **Config**: TOML run settings and JSON bounds configuration

pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod optimization;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{BoundsConfig, ConfigError, OptimizerConfig};

// Re-export error taxonomy
pub use error::{ConfigurationError, RunError};

// Re-export data model
pub use types::{
    ControlVariable, DynamicBounds, OptimizationProblem, OptimizationResult, ProblemState,
    SubproblemFailure, TimestepRecord,
};

// Re-export the run surface
pub use history::HistoricalTable;
pub use model::{LinearResponseModel, ModelError, ResponseModel};
pub use optimization::{ResultTable, RunParameters, RunSummary, Scheduler, SolverSettings, WorkerPool};
pub use pipeline::{run_optimization, RunOptions};
