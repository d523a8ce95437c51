//! Bounded Nelder-Mead solver for a single subproblem
//!
//! argmin's Nelder-Mead is unconstrained, so bounds are enforced by
//! projection: a vertex outside the box is scored at its projection plus a
//! quadratic penalty on the normalised violation, and the reported optimum
//! is always projected back into the box. The iteration ceiling is handed
//! to the executor, so the solver returns its best vertex at the ceiling
//! rather than running on.
//!
//! argmin unwraps the cost of the initial simplex, so the cost function
//! never returns an error. The first evaluation failure is parked next to
//! the solver, the point is scored as `+inf`, and the failure is reported
//! once the executor returns.

use std::cell::RefCell;

use argmin::core::{CostFunction, Error, Executor, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use super::objective::{Evaluation, ObjectiveEvaluator};
use crate::config::defaults::{
    DEFAULT_INITIAL_STEP_FRACTION, DEFAULT_SD_TOLERANCE, OUT_OF_BOUNDS_PENALTY,
};
use crate::types::{DynamicBounds, OptimizationProblem, ProblemState, SubproblemFailure};

/// Solver tuning shared by every subproblem of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Converged once the standard deviation of simplex costs drops below this
    pub sd_tolerance: f64,
    /// Initial simplex edge, as a fraction of each bound width
    pub initial_step_fraction: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            sd_tolerance: DEFAULT_SD_TOLERANCE,
            initial_step_fraction: DEFAULT_INITIAL_STEP_FRACTION,
        }
    }
}

/// Best point found for one subproblem.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub setpoints: Vec<f64>,
    pub objective: f64,
    pub prediction: f64,
    pub iterations: u64,
    /// `Converged` or `BudgetExhausted`
    pub state: ProblemState,
}

/// Cost function handed to argmin: borrows the worker's evaluator and the
/// claimed problem, nothing is copied.
struct BoundedObjective<'a> {
    evaluator: &'a ObjectiveEvaluator,
    problem: &'a OptimizationProblem,
    /// First evaluation failure; once set every later point scores `+inf`
    failure: &'a RefCell<Option<SubproblemFailure>>,
}

impl CostFunction for BoundedObjective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        if self.failure.borrow().is_some() {
            return Ok(f64::INFINITY);
        }
        let projected = project(param, &self.problem.bounds);
        let violation = violation_penalty(param, &self.problem.bounds);
        match self.evaluator.evaluate(&projected, self.problem) {
            Ok(Evaluation { objective, .. }) => Ok(objective + OUT_OF_BOUNDS_PENALTY * violation),
            Err(failure) => {
                *self.failure.borrow_mut() = Some(failure);
                Ok(f64::INFINITY)
            }
        }
    }
}

/// Run the bounded solver on one problem.
pub fn solve(
    evaluator: &ObjectiveEvaluator,
    problem: &OptimizationProblem,
    settings: &SolverSettings,
) -> Result<SolverOutcome, SubproblemFailure> {
    check_bounds(problem)?;

    let simplex = initial_simplex(problem, settings.initial_step_fraction);
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(settings.sd_tolerance)
        .map_err(|e| SubproblemFailure::Solver(e.to_string()))?;

    let failure = RefCell::new(None);
    let objective = BoundedObjective {
        evaluator,
        problem,
        failure: &failure,
    };
    let max_iter = problem.max_iter;
    let result = Executor::new(objective, solver)
        .configure(|state| state.max_iters(max_iter))
        .run();
    if let Some(failure) = failure.take() {
        return Err(failure);
    }
    let result = result.map_err(into_failure)?;

    let state = match &result.state.termination_status {
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            ProblemState::BudgetExhausted
        }
        _ => ProblemState::Converged,
    };
    let iterations = result.state.iter;
    let best = result.state.best_param.ok_or(SubproblemFailure::NoSolution)?;

    // Report the projected optimum and score it without the penalty term.
    let setpoints = project(&best, &problem.bounds);
    let Evaluation {
        objective,
        prediction,
    } = evaluator.evaluate(&setpoints, problem)?;

    Ok(SolverOutcome {
        setpoints,
        objective,
        prediction,
        iterations,
        state,
    })
}

fn check_bounds(problem: &OptimizationProblem) -> Result<(), SubproblemFailure> {
    match problem.bounds.iter().position(|b| !b.is_valid()) {
        None => Ok(()),
        Some(i) => Err(SubproblemFailure::DegenerateBounds {
            position: i,
            min_b: problem.bounds[i].min_b,
            max_b: problem.bounds[i].max_b,
        }),
    }
}

/// Errors argmin raises on its own come back as `argmin::core::Error`;
/// recover a wrapped failure when there is one.
fn into_failure(err: Error) -> SubproblemFailure {
    match err.downcast::<SubproblemFailure>() {
        Ok(failure) => failure,
        Err(other) => SubproblemFailure::Solver(other.to_string()),
    }
}

fn project(param: &[f64], bounds: &[DynamicBounds]) -> Vec<f64> {
    param
        .iter()
        .zip(bounds)
        .map(|(&x, b)| b.project(x))
        .collect()
}

fn violation_penalty(param: &[f64], bounds: &[DynamicBounds]) -> f64 {
    param
        .iter()
        .zip(bounds)
        .map(|(&x, b)| {
            let outside = (b.min_b - x).max(x - b.max_b).max(0.0) / b.width();
            outside * outside
        })
        .sum()
}

/// Start at the last observed values (projected into the box) plus one
/// vertex per dimension stepped towards the interior.
fn initial_simplex(problem: &OptimizationProblem, step_fraction: f64) -> Vec<Vec<f64>> {
    let start = project(&problem.initial, &problem.bounds);
    let mut vertices = Vec::with_capacity(problem.dimension() + 1);
    vertices.push(start.clone());

    for (i, b) in problem.bounds.iter().enumerate() {
        let step = step_fraction * b.width();
        let mut vertex = start.clone();
        vertex[i] = if start[i] + step <= b.max_b {
            start[i] + step
        } else {
            start[i] - step
        };
        vertices.push(vertex);
    }

    vertices
}
