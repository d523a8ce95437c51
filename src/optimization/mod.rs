//! Setpoint optimization core
//!
//! One independent bounded subproblem per historical timestamp:
//!
//! ```text
//! records -> SubproblemBuilder -> [OptimizationProblem]
//!         -> Scheduler (W workers, each: ObjectiveEvaluator + solver)
//!         -> ResultAggregator -> ResultTable (input order)
//! ```

mod aggregator;
mod bounds;
mod builder;
mod objective;
mod scheduler;
pub mod solver;

pub use aggregator::{ResultAggregator, ResultTable, RunSummary};
pub use bounds::{bounds_for_record, compute_dynamic_bounds, BoundsPolicy};
pub use builder::{RunParameters, SubproblemBuilder};
pub use objective::{Evaluation, ObjectiveEvaluator};
pub use scheduler::{available_processing_units, Scheduler, WorkerPool};
pub use solver::{solve, SolverOutcome, SolverSettings};
