//! Run-level error taxonomy
//!
//! - [`ConfigurationError`]: fatal, raised before any subproblem is dispatched
//! - [`crate::types::SubproblemFailure`]: per-timestamp, recorded as data
//! - [`RunError`]: what a whole run reports back to its caller

use std::path::PathBuf;
use thiserror::Error;

/// Fatal pre-dispatch configuration problem.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid bounds configuration: {0}")]
    Bounds(String),

    #[error("Worker pool size must satisfy 1 < W <= {available}, got {requested}")]
    PoolSize { requested: usize, available: usize },

    #[error("Failed to start worker pool: {0}")]
    PoolStart(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid run parameter: {0}")]
    Parameter(String),

    #[error("Model does not match the configured variables: {0}")]
    ModelMismatch(String),

    #[error("Invalid model: {0}")]
    Model(String),

    #[error("Historical data error ({}): {message}", path.display())]
    History { path: PathBuf, message: String },

    #[error("I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Overall failure of an optimization run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("All {count} subproblems failed")]
    AllSubproblemsFailed { count: usize },
}
