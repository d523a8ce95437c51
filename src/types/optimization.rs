//! Optimization data model: control variables, per-timestamp bounds,
//! subproblems and their results

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A process input the optimizer is permitted to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlVariable {
    /// Column / tag name
    pub name: String,
    /// Global lower bound (fixed for the whole run)
    pub lo: f64,
    /// Global upper bound (fixed for the whole run)
    pub hi: f64,
    /// Fraction of the last observed value a setpoint may move in one step
    pub rate: f64,
}

impl ControlVariable {
    /// Width of the global range, used to normalise moves between variables
    /// of very different magnitude.
    pub fn span(&self) -> f64 {
        self.hi - self.lo
    }
}

/// Feasible interval for one control variable at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicBounds {
    pub min_b: f64,
    pub max_b: f64,
}

impl DynamicBounds {
    pub fn width(&self) -> f64 {
        self.max_b - self.min_b
    }

    /// Finite endpoints and strictly positive width.
    pub fn is_valid(&self) -> bool {
        self.min_b.is_finite() && self.max_b.is_finite() && self.min_b < self.max_b
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_b && value <= self.max_b
    }

    /// Project a value onto the interval.
    ///
    /// Unlike `f64::clamp` this never panics, so it is safe to call before
    /// the bounds have been validated.
    pub fn project(&self, value: f64) -> f64 {
        value.max(self.min_b).min(self.max_b)
    }
}

/// One timestamp's self-contained bounded optimization task.
///
/// Built once by the subproblem builder, then only ever read by the single
/// worker that claims it.
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    /// Position in the input sequence (used to restore ordering)
    pub index: usize,
    pub timestamp: NaiveDateTime,
    /// Last observed controllable values (solver start point)
    pub initial: Vec<f64>,
    /// Per-variable feasible interval, same order as `initial`
    pub bounds: Vec<DynamicBounds>,
    /// Global span of each control variable
    pub spans: Vec<f64>,
    /// Noncontrollable context values
    pub context: Vec<f64>,
    /// Trade-off scalar `c`
    pub trade_off: f64,
    /// Hard iteration ceiling for the solver
    pub max_iter: u64,
    /// Historical response, reported alongside the optimum
    pub historical_response: Option<f64>,
}

impl OptimizationProblem {
    pub fn dimension(&self) -> usize {
        self.initial.len()
    }
}

/// Lifecycle of a single subproblem.
///
/// `Pending -> Running -> {Converged, BudgetExhausted, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemState {
    Pending,
    Running,
    Converged,
    /// Iteration ceiling reached; the best point found is still reported
    BudgetExhausted,
    Failed,
}

impl ProblemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::BudgetExhausted | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => next.is_terminal(),
            Self::Converged | Self::BudgetExhausted | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for ProblemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Converged => write!(f, "converged"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a single subproblem could not produce an optimum.
///
/// Recorded against that timestamp only; never aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubproblemFailure {
    #[error("Degenerate bounds for control variable {position}: [{min_b}, {max_b}]")]
    DegenerateBounds {
        position: usize,
        min_b: f64,
        max_b: f64,
    },

    #[error("Model evaluation failed: {0}")]
    ModelEvaluation(String),

    #[error("Objective is not finite: {0}")]
    NonFiniteObjective(f64),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Solver returned no point")]
    NoSolution,

    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    #[error("No result collected for this timestamp")]
    NotCollected,
}

/// Outcome of one subproblem, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub state: ProblemState,
    /// Optimal setpoints; `None` is the missing-value sentinel of a failed row
    pub setpoints: Option<Vec<f64>>,
    pub objective: Option<f64>,
    pub predicted_response: Option<f64>,
    pub historical_response: Option<f64>,
    pub iterations: u64,
    pub failure: Option<SubproblemFailure>,
}

impl OptimizationResult {
    /// Sentinel row for a failed subproblem.
    pub fn failed(problem: &OptimizationProblem, failure: SubproblemFailure) -> Self {
        Self::sentinel(
            problem.index,
            problem.timestamp,
            problem.historical_response,
            failure,
        )
    }

    pub fn sentinel(
        index: usize,
        timestamp: NaiveDateTime,
        historical_response: Option<f64>,
        failure: SubproblemFailure,
    ) -> Self {
        Self {
            index,
            timestamp,
            state: ProblemState::Failed,
            setpoints: None,
            objective: None,
            predicted_response: None,
            historical_response,
            iterations: 0,
            failure: Some(failure),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == ProblemState::Failed
    }
}
