//! System-wide default constants.
//!
//! Centralises magic numbers used by the bounds engine, solver and loaders.

// ============================================================================
// Bounds Engine
// ============================================================================

/// Offset applied when a clipped endpoint would otherwise touch the opposite
/// global bound.
pub const LOWER_CLIP_EPSILON: f64 = 1e-4;

/// Fixed widening added to every upper bound so intervals never collapse.
pub const UPPER_WIDENING: f64 = 1e-3;

// ============================================================================
// Solver
// ============================================================================

/// Iteration ceiling per subproblem.
pub const DEFAULT_MAX_ITER: u64 = 100;

/// Nelder-Mead convergence: standard deviation of simplex costs.
pub const DEFAULT_SD_TOLERANCE: f64 = 1e-8;

/// Initial simplex edge as a fraction of each variable's bound width.
pub const DEFAULT_INITIAL_STEP_FRACTION: f64 = 0.25;

/// Weight of the quadratic penalty applied to points outside the bounds.
pub const OUT_OF_BOUNDS_PENALTY: f64 = 1e6;

// ============================================================================
// Historical Data
// ============================================================================

/// Index column of the historical table.
pub const TIMESTAMP_COLUMN: &str = "Date";

/// Response column of the historical table.
pub const RESPONSE_COLUMN: &str = "RESPONSE";

/// Timestamp format used when writing result tables.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse errors logged individually before switching to a count.
pub const MAX_LOGGED_PARSE_ERRORS: usize = 10;

// ============================================================================
// Config Search
// ============================================================================

/// Environment variable naming the run config file.
pub const CONFIG_ENV_VAR: &str = "BOILER_OPT_CONFIG";

/// Run config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "optimizer.toml";
