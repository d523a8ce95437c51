//! Configuration
//!
//! - [`OptimizerConfig`]: run tuning from TOML
//! - [`BoundsConfig`]: per-variable rate and global range from JSON
//!
//! ## Loading Order (run config)
//!
//! 1. `BOILER_OPT_CONFIG` environment variable (path to TOML file)
//! 2. `optimizer.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Command-line flags override whatever was loaded.

mod bounds;
pub mod defaults;
mod run_config;
pub mod validation;

pub use bounds::BoundsConfig;
pub use run_config::*;
