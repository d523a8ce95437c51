//! Objective evaluator
//!
//! Scores a candidate setpoint vector for one subproblem. The run minimises
//!
//! ```text
//! score(x) = -predict(x ++ context) + c * Σ ((x_i - last_i) / span_i)^2
//! ```
//!
//! i.e. it maximises the predicted response while charging `c` for
//! normalised moves away from the last observed setpoints.

use std::cell::RefCell;
use std::sync::Arc;

use crate::model::ResponseModel;
use crate::types::{OptimizationProblem, SubproblemFailure};

/// Score and model prediction at one candidate point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub objective: f64,
    pub prediction: f64,
}

/// Per-worker evaluator.
///
/// Holds the worker's model handle for the worker's whole lifetime plus a
/// reusable feature buffer, so each call only copies the candidate and
/// context into an existing allocation. Not `Sync`: one per worker thread.
pub struct ObjectiveEvaluator {
    model: Arc<dyn ResponseModel>,
    features: RefCell<Vec<f64>>,
}

impl ObjectiveEvaluator {
    pub fn new(model: Arc<dyn ResponseModel>) -> Self {
        let width = model.feature_names().len();
        Self {
            model,
            features: RefCell::new(Vec::with_capacity(width)),
        }
    }

    /// Model prediction for `setpoints` in the given context.
    pub fn predict(&self, setpoints: &[f64], context: &[f64]) -> Result<f64, SubproblemFailure> {
        let mut features = self.features.borrow_mut();
        features.clear();
        features.extend_from_slice(setpoints);
        features.extend_from_slice(context);

        let prediction = self
            .model
            .predict(&features)
            .map_err(|e| SubproblemFailure::ModelEvaluation(e.to_string()))?;
        if !prediction.is_finite() {
            return Err(SubproblemFailure::ModelEvaluation(format!(
                "model returned {prediction}"
            )));
        }
        Ok(prediction)
    }

    /// Score `setpoints` against `problem`'s context, start point and `c`.
    pub fn evaluate(
        &self,
        setpoints: &[f64],
        problem: &OptimizationProblem,
    ) -> Result<Evaluation, SubproblemFailure> {
        let prediction = self.predict(setpoints, &problem.context)?;
        let objective = -prediction + problem.trade_off * move_penalty(setpoints, problem);

        if !objective.is_finite() {
            return Err(SubproblemFailure::NonFiniteObjective(objective));
        }
        Ok(Evaluation {
            objective,
            prediction,
        })
    }
}

/// Sum of squared moves from the last observed values, each normalised by
/// its variable's global span.
fn move_penalty(setpoints: &[f64], problem: &OptimizationProblem) -> f64 {
    setpoints
        .iter()
        .zip(&problem.initial)
        .zip(&problem.spans)
        .map(|((x, last), span)| {
            let step = (x - last) / span;
            step * step
        })
        .sum()
}
