//! Shared data model
//!
//! - [`TimestepRecord`]: one historical row split by variable role
//! - [`ControlVariable`], [`DynamicBounds`]: global and per-timestep limits
//! - [`OptimizationProblem`]: immutable unit of work handed to a worker
//! - [`OptimizationResult`], [`ProblemState`], [`SubproblemFailure`]: what comes back

mod optimization;
mod record;

pub use optimization::*;
pub use record::*;
