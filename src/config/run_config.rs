//! Run configuration: optimizer tuning as operator-editable TOML
//!
//! Every field defaults to the values in [`super::defaults`], so an empty
//! or missing file reproduces the stock behaviour.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::{
    CONFIG_ENV_VAR, DEFAULT_INITIAL_STEP_FRACTION, DEFAULT_MAX_ITER, DEFAULT_SD_TOLERANCE,
    LOCAL_CONFIG_FILE, LOWER_CLIP_EPSILON, RESPONSE_COLUMN, TIMESTAMP_COLUMN, UPPER_WIDENING,
};
use crate::optimization::{BoundsPolicy, RunParameters, SolverSettings};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of an optimization run.
///
/// Load with `OptimizerConfig::load()` which searches:
/// 1. `$BOILER_OPT_CONFIG` env var
/// 2. `./optimizer.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub solver: SolverSection,

    /// Dynamic bounds offsets
    #[serde(default)]
    pub bounds: BoundsSection,

    /// Input file locations
    #[serde(default)]
    pub paths: PathsSection,
}

impl OptimizerConfig {
    /// Load configuration using the standard search order. A file that
    /// fails to load is reported and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded optimizer config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded optimizer config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;

        for w in super::validation::check_suspicious_values(&config) {
            warn!(field = %w.field, "{}", w);
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every field; all violations are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let r = &self.run;
        if !r.trade_off.is_finite() || r.trade_off < 0.0 {
            errors.push(format!("run.trade_off must be finite and >= 0 (got {})", r.trade_off));
        }
        if r.max_iter == 0 {
            errors.push("run.max_iter must be > 0".to_string());
        }
        if r.workers == 1 {
            errors.push("run.workers must be 0 (all units) or at least 2".to_string());
        }
        if r.timestamp_column.trim().is_empty() {
            errors.push("run.timestamp_column must not be empty".to_string());
        }
        if r.response_column.trim().is_empty() {
            errors.push("run.response_column must not be empty".to_string());
        }

        let s = &self.solver;
        if !(s.sd_tolerance.is_finite() && s.sd_tolerance > 0.0) {
            errors.push(format!("solver.sd_tolerance must be > 0 (got {})", s.sd_tolerance));
        }
        if !(s.initial_step_fraction.is_finite()
            && s.initial_step_fraction > 0.0
            && s.initial_step_fraction <= 1.0)
        {
            errors.push(format!(
                "solver.initial_step_fraction must be in (0, 1] (got {})",
                s.initial_step_fraction
            ));
        }

        let b = &self.bounds;
        check_positive(b.lower_clip_epsilon, "bounds.lower_clip_epsilon", &mut errors);
        check_positive(b.upper_widening, "bounds.upper_widening", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn run_parameters(&self) -> RunParameters {
        RunParameters {
            trade_off: self.run.trade_off,
            max_iter: self.run.max_iter,
            bounds_policy: BoundsPolicy {
                lower_clip_epsilon: self.bounds.lower_clip_epsilon,
                upper_widening: self.bounds.upper_widening,
            },
        }
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            sd_tolerance: self.solver.sd_tolerance,
            initial_step_fraction: self.solver.initial_step_fraction,
        }
    }
}

fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
    // NaN compares false, so test finiteness explicitly
    if !value.is_finite() || value <= 0.0 {
        errors.push(format!("{name} must be finite and > 0 (got {value})"));
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    /// Weight `c` of the move penalty
    #[serde(default)]
    pub trade_off: f64,

    /// Iteration budget per subproblem
    #[serde(default = "default_max_iter")]
    pub max_iter: u64,

    /// Pool size; 0 uses every available processing unit
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    #[serde(default = "default_response_column")]
    pub response_column: String,
}

fn default_max_iter() -> u64 {
    DEFAULT_MAX_ITER
}
fn default_timestamp_column() -> String {
    TIMESTAMP_COLUMN.to_string()
}
fn default_response_column() -> String {
    RESPONSE_COLUMN.to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            trade_off: 0.0,
            max_iter: default_max_iter(),
            workers: 0,
            timestamp_column: default_timestamp_column(),
            response_column: default_response_column(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSection {
    #[serde(default = "default_sd_tolerance")]
    pub sd_tolerance: f64,

    #[serde(default = "default_initial_step_fraction")]
    pub initial_step_fraction: f64,
}

fn default_sd_tolerance() -> f64 { DEFAULT_SD_TOLERANCE }
fn default_initial_step_fraction() -> f64 { DEFAULT_INITIAL_STEP_FRACTION }

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            sd_tolerance: default_sd_tolerance(),
            initial_step_fraction: default_initial_step_fraction(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsSection {
    #[serde(default = "default_lower_clip_epsilon")]
    pub lower_clip_epsilon: f64,

    #[serde(default = "default_upper_widening")]
    pub upper_widening: f64,
}

fn default_lower_clip_epsilon() -> f64 { LOWER_CLIP_EPSILON }
fn default_upper_widening() -> f64 { UPPER_WIDENING }

impl Default for BoundsSection {
    fn default() -> Self {
        Self {
            lower_clip_epsilon: default_lower_clip_epsilon(),
            upper_widening: default_upper_widening(),
        }
    }
}

/// Input files. Each may also be given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PathBuf>,
}

// ============================================================================
// Tests
// ============================================================================
