//! Run-config linting
//!
//! The raw TOML is read as a plain `toml::Value` before serde sees it. Every
//! dotted key path is checked against the sections and fields the optimizer
//! understands; a stray key is reported together with the closest known key.
//! A second pass flags settings that are legal but unusual. Nothing here
//! rejects a config.

use std::collections::HashSet;

/// Largest edit distance at which a known key is still offered as a fix.
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Sections of the run config and the fields each one accepts.
const CONFIG_SECTIONS: &[(&str, &[&str])] = &[
    (
        "run",
        &["trade_off", "max_iter", "workers", "timestamp_column", "response_column"],
    ),
    ("solver", &["sd_tolerance", "initial_step_fraction"]),
    ("bounds", &["lower_clip_epsilon", "upper_widening"]),
    ("paths", &["history", "bounds", "model"]),
];

/// A non-fatal remark about a config file.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Dotted key path, or section name
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    fn unknown_key(path: &str, known: &HashSet<String>) -> Self {
        Self {
            field: path.to_string(),
            message: format!("Unknown config key '{path}'"),
            suggestion: suggest_correction(path, known),
        }
    }

    fn suspicious(field: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            message,
            suggestion: None,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suggestion {
            Some(fix) => write!(f, "{} (did you mean '{fix}'?)", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Section names plus every `section.field` path of [`super::OptimizerConfig`].
pub fn known_config_keys() -> HashSet<String> {
    CONFIG_SECTIONS
        .iter()
        .flat_map(|(section, fields)| {
            std::iter::once(section.to_string())
                .chain(fields.iter().map(move |field| format!("{section}.{field}")))
        })
        .collect()
}

/// Dotted paths of every key in `value`, nested tables included, parents
/// before their children.
fn key_paths(value: &toml::Value) -> Vec<String> {
    fn visit(table: &toml::Table, prefix: Option<&str>, out: &mut Vec<String>) {
        for (key, child) in table {
            let path = prefix.map_or_else(|| key.clone(), |p| format!("{p}.{key}"));
            out.push(path.clone());
            if let toml::Value::Table(inner) = child {
                visit(inner, Some(&path), out);
            }
        }
    }

    let mut paths = Vec::new();
    if let toml::Value::Table(root) = value {
        visit(root, None, &mut paths);
    }
    paths
}

/// Edit distance counted in characters, so non-ASCII keys compare correctly.
fn edit_distance(a: &str, b: &str) -> usize {
    let target: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in target.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[target.len()]
}

/// Closest known key within [`MAX_SUGGESTION_DISTANCE`] edits. Ties go to
/// the alphabetically first key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|key| (edit_distance(unknown, key), key))
        .filter(|&(distance, _)| distance <= MAX_SUGGESTION_DISTANCE)
        .min()
        .map(|(_, key)| key.clone())
}

/// Warnings for every key in `raw_toml` the optimizer does not read.
///
/// TOML that does not parse yields nothing here; the serde pass reports it.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    key_paths(&value)
        .iter()
        .filter(|path| !known.contains(path.as_str()))
        .map(|path| ValidationWarning::unknown_key(path, &known))
        .collect()
}

/// Legal but unusual settings.
pub fn check_suspicious_values(config: &super::OptimizerConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if config.run.max_iter > 100_000 {
        warnings.push(ValidationWarning::suspicious(
            "run.max_iter",
            format!(
                "run.max_iter = {} is very large; each subproblem may run for a long time",
                config.run.max_iter
            ),
        ));
    }

    // Offsets wider than the windows they adjust dominate small setpoints
    let bounds = &config.bounds;
    if bounds.lower_clip_epsilon > 0.1 || bounds.upper_widening > 0.1 {
        warnings.push(ValidationWarning::suspicious(
            "bounds",
            format!(
                "bounds offsets ({}, {}) are large relative to typical setpoint scales",
                bounds.lower_clip_epsilon, bounds.upper_widening
            ),
        ));
    }

    warnings
}
