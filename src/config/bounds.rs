//! Bounds configuration: per-variable rate and global range
//!
//! JSON layout, one entry per controllable variable in feature order:
//!
//! ```json
//! {
//!   "controllable": {
//!     "FUEL OIL CONTROL": { "rate": 0.05, "bounds": [0.0, 92.4] }
//!   },
//!   "noncontrollable": ["FEED WATER TEMP", "DRUM PRESSURE"]
//! }
//! ```
//!
//! Object key order is significant and preserved.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigurationError;
use crate::history::HistoricalTable;
use crate::types::ControlVariable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ControlSpec {
    rate: f64,
    bounds: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct RawBoundsConfig {
    controllable: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    noncontrollable: Vec<String>,
}

/// Controllable variables with their limits, plus the context columns.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsConfig {
    pub controllable: Vec<ControlVariable>,
    pub noncontrollable: Vec<String>,
}

impl BoundsConfig {
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigurationError> {
        let raw: RawBoundsConfig = serde_json::from_str(contents)
            .map_err(|e| ConfigurationError::Bounds(e.to_string()))?;

        let mut controllable = Vec::with_capacity(raw.controllable.len());
        for (name, value) in raw.controllable {
            let spec: ControlSpec = serde_json::from_value(value)
                .map_err(|e| ConfigurationError::Bounds(format!("{name}: {e}")))?;
            controllable.push(ControlVariable {
                name,
                lo: spec.bounds[0],
                hi: spec.bounds[1],
                rate: spec.rate,
            });
        }

        let config = Self {
            controllable,
            noncontrollable: raw.noncontrollable,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            controllable = config.controllable.len(),
            noncontrollable = config.noncontrollable.len(),
            "Loaded bounds configuration"
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigurationError> {
        let mut controllable = serde_json::Map::new();
        for var in &self.controllable {
            let spec = ControlSpec {
                rate: var.rate,
                bounds: [var.lo, var.hi],
            };
            let value = serde_json::to_value(spec)
                .map_err(|e| ConfigurationError::Bounds(e.to_string()))?;
            controllable.insert(var.name.clone(), value);
        }
        let doc = serde_json::json!({
            "controllable": controllable,
            "noncontrollable": self.noncontrollable,
        });
        serde_json::to_string_pretty(&doc).map_err(|e| ConfigurationError::Bounds(e.to_string()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigurationError> {
        let contents = self.to_json()?;
        std::fs::write(path, contents).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Bounds configuration saved");
        Ok(())
    }

    pub fn controllable_names(&self) -> Vec<String> {
        self.controllable.iter().map(|v| v.name.clone()).collect()
    }

    /// Collect every structural problem into one error.
    ///
    /// - at least one controllable variable
    /// - `0 <= rate < 1`
    /// - finite bounds with `lo < hi`
    /// - no name used twice, across both lists
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();

        if self.controllable.is_empty() {
            errors.push("no controllable variables configured".to_string());
        }

        for var in &self.controllable {
            if !(var.rate.is_finite() && (0.0..1.0).contains(&var.rate)) {
                errors.push(format!("{}: rate must be in [0, 1), got {}", var.name, var.rate));
            }
            if !var.lo.is_finite() || !var.hi.is_finite() {
                errors.push(format!(
                    "{}: bounds must be finite, got [{}, {}]",
                    var.name, var.lo, var.hi
                ));
            } else if var.lo >= var.hi {
                errors.push(format!(
                    "{}: lower bound {} must be below upper bound {}",
                    var.name, var.lo, var.hi
                ));
            }
        }

        let mut seen = HashSet::new();
        let names = self
            .controllable
            .iter()
            .map(|v| v.name.as_str())
            .chain(self.noncontrollable.iter().map(String::as_str));
        for name in names {
            if !seen.insert(name) {
                errors.push(format!("{name}: listed more than once"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Bounds(errors.join("; ")))
        }
    }

    /// Derive a configuration from historical observations.
    ///
    /// Global bounds of each controllable tag are the min and max of its
    /// finite historical values; `rates` are given in the same order as
    /// `controllable`. Noncontrollable tags absent from the table are
    /// dropped with a warning.
    pub fn generate_from_history(
        table: &HistoricalTable,
        controllable: &[String],
        rates: &[f64],
        noncontrollable: &[String],
    ) -> Result<Self, ConfigurationError> {
        if rates.len() != controllable.len() {
            return Err(ConfigurationError::Bounds(format!(
                "{} rates given for {} controllable tags",
                rates.len(),
                controllable.len()
            )));
        }

        let missing: Vec<String> = controllable
            .iter()
            .filter(|tag| table.column_index(tag).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigurationError::MissingColumns(missing));
        }

        let mut variables = Vec::with_capacity(controllable.len());
        for (tag, &rate) in controllable.iter().zip(rates) {
            let (lo, hi) = table.observed_range(tag).ok_or_else(|| {
                ConfigurationError::Bounds(format!("{tag}: no finite historical values"))
            })?;
            variables.push(ControlVariable {
                name: tag.clone(),
                lo,
                hi,
                rate,
            });
        }

        let context = noncontrollable
            .iter()
            .filter(|tag| {
                let present = table.column_index(tag).is_some();
                if !present {
                    warn!(tag = %tag, "Noncontrollable tag not in history, dropping");
                }
                present
            })
            .cloned()
            .collect();

        let config = Self {
            controllable: variables,
            noncontrollable: context,
        };
        config.validate()?;
        Ok(config)
    }
}
