//! Predictive response model
//!
//! The optimizer treats the trained model as a black box exposing a single
//! `predict(features) -> response` call. Feature order is always the
//! control variables followed by the noncontrollable context.
//!
//! [`LinearResponseModel`] is the serialisable model shipped with the crate:
//! an intercept, one linear coefficient per feature and optional diagonal
//! quadratic terms so a response surface can peak inside the bounds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Expected {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Non-finite feature at position {0}")]
    NonFiniteFeature(usize),

    #[error("{0}")]
    Evaluation(String),
}

/// A trained model usable from any worker thread.
pub trait ResponseModel: Send + Sync {
    /// Feature names in the order `predict` expects them.
    fn feature_names(&self) -> &[String];

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

/// Check that a model consumes exactly `controllable ++ context`.
pub fn check_feature_layout(
    model: &dyn ResponseModel,
    controllable: &[String],
    context: &[String],
) -> Result<(), ConfigurationError> {
    let expected: Vec<&str> = controllable
        .iter()
        .chain(context)
        .map(String::as_str)
        .collect();
    let actual: Vec<&str> = model.feature_names().iter().map(String::as_str).collect();

    if expected == actual {
        return Ok(());
    }

    let first_diff = expected
        .iter()
        .zip(&actual)
        .position(|(e, a)| e != a)
        .unwrap_or_else(|| expected.len().min(actual.len()));
    Err(ConfigurationError::ModelMismatch(format!(
        "model has {} features, configuration has {}; first difference at position {}",
        actual.len(),
        expected.len(),
        first_diff
    )))
}

/// `y = intercept + Σ coefficients[i] * x[i] + Σ quadratic[i] * x[i]^2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearResponseModel {
    pub intercept: f64,
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quadratic: Vec<f64>,
}

impl LinearResponseModel {
    pub fn new(
        intercept: f64,
        features: Vec<String>,
        coefficients: Vec<f64>,
    ) -> Result<Self, ConfigurationError> {
        let model = Self {
            intercept,
            features,
            coefficients,
            quadratic: Vec::new(),
        };
        model.validate()?;
        Ok(model)
    }

    pub fn with_quadratic(mut self, quadratic: Vec<f64>) -> Result<Self, ConfigurationError> {
        self.quadratic = quadratic;
        self.validate()?;
        Ok(self)
    }

    /// Load a model from its JSON representation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigurationError::Model(format!("{}: {e}", path.display())))?;
        model.validate()?;
        info!(
            path = %path.display(),
            features = model.features.len(),
            quadratic = !model.quadratic.is_empty(),
            "Loaded response model"
        );
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();

        if self.features.is_empty() {
            errors.push("model has no features".to_string());
        }
        if self.coefficients.len() != self.features.len() {
            errors.push(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.features.len()
            ));
        }
        if !self.quadratic.is_empty() && self.quadratic.len() != self.features.len() {
            errors.push(format!(
                "{} quadratic terms for {} features",
                self.quadratic.len(),
                self.features.len()
            ));
        }
        let all_finite = std::iter::once(&self.intercept)
            .chain(&self.coefficients)
            .chain(&self.quadratic)
            .all(|v| v.is_finite());
        if !all_finite {
            errors.push("model parameters must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Model(errors.join("; ")))
        }
    }
}

impl ResponseModel for LinearResponseModel {
    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.coefficients.len() {
            return Err(ModelError::FeatureCount {
                expected: self.coefficients.len(),
                actual: features.len(),
            });
        }
        if let Some(pos) = features.iter().position(|x| !x.is_finite()) {
            return Err(ModelError::NonFiniteFeature(pos));
        }

        let linear: f64 = features
            .iter()
            .zip(&self.coefficients)
            .map(|(x, w)| x * w)
            .sum();
        let quadratic: f64 = features
            .iter()
            .zip(&self.quadratic)
            .map(|(x, q)| q * x * x)
            .sum();

        Ok(self.intercept + linear + quadratic)
    }
}
