//! Subproblem scheduler (worker pool)
//!
//! Runs independent subproblems on a fixed-size rayon pool. Every pool
//! thread is one worker: it acquires its model handle and evaluator once,
//! then claims problems from a shared cursor until none remain. Workers
//! never touch shared mutable state beyond that cursor and the progress
//! counters; results travel back as each worker's return value and are
//! put back into input order by the aggregator.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::aggregator::{ResultAggregator, ResultTable};
use super::objective::ObjectiveEvaluator;
use super::solver::{self, SolverSettings};
use crate::error::{ConfigurationError, RunError};
use crate::model::ResponseModel;
use crate::types::{OptimizationProblem, OptimizationResult, ProblemState, SubproblemFailure};

/// Number of processing units visible to this process.
pub fn available_processing_units() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Validated pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// `1 < workers <= available`; anything else is fatal at start-up.
    pub fn new(workers: usize, available: usize) -> Result<Self, ConfigurationError> {
        if workers <= 1 || workers > available {
            return Err(ConfigurationError::PoolSize {
                requested: workers,
                available,
            });
        }
        Ok(Self { workers })
    }

    /// Validate against the processing units of this machine. `0` requests
    /// every available unit.
    pub fn detect(workers: usize) -> Result<Self, ConfigurationError> {
        let available = available_processing_units();
        let requested = if workers == 0 { available } else { workers };
        Self::new(requested, available)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Live counters shared by the workers, read for progress logging.
#[derive(Debug, Default)]
struct PoolProgress {
    running: AtomicUsize,
    converged: AtomicUsize,
    budget_exhausted: AtomicUsize,
    failed: AtomicUsize,
}

impl PoolProgress {
    fn start(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, state: ProblemState) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        let counter = match state {
            ProblemState::Converged => &self.converged,
            ProblemState::BudgetExhausted => &self.budget_exhausted,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    fn completed(&self) -> usize {
        self.converged.load(Ordering::Relaxed)
            + self.budget_exhausted.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }
}

/// Fans subproblems out over the worker pool and aggregates the results.
pub struct Scheduler {
    pool: WorkerPool,
    solver: SolverSettings,
}

impl Scheduler {
    pub fn new(pool: WorkerPool, solver: SolverSettings) -> Self {
        Self { pool, solver }
    }

    /// Solve every problem and return one row per problem in input order.
    ///
    /// Per-problem failures become sentinel rows. The run itself fails only
    /// if the pool cannot start or every problem failed.
    pub fn run(
        &self,
        problems: &[OptimizationProblem],
        model: Arc<dyn ResponseModel>,
        variables: Vec<String>,
    ) -> Result<ResultTable, RunError> {
        let started = Instant::now();
        let workers = self.pool.workers();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("optimizer-worker-{i}"))
            .build()
            .map_err(|e| ConfigurationError::PoolStart(e.to_string()))?;

        info!(
            problems = problems.len(),
            workers,
            "Dispatching subproblems"
        );

        let cursor = AtomicUsize::new(0);
        let progress = PoolProgress::default();
        let settings = self.solver;

        let batches: Vec<Vec<OptimizationResult>> = pool.broadcast(|ctx| {
            run_worker(ctx.index(), problems, &cursor, &model, &settings, &progress)
        });

        let mut aggregator = ResultAggregator::new(problems);
        for result in batches.into_iter().flatten() {
            aggregator.record(result);
        }
        debug!(
            collected = aggregator.collected(),
            expected = problems.len(),
            "Worker results gathered"
        );
        let table = aggregator.finish(variables);
        let summary = table.summary();

        info!(
            rows = table.len(),
            converged = summary.converged,
            budget_exhausted = summary.budget_exhausted,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Optimization run complete"
        );

        if table.all_failed() {
            return Err(RunError::AllSubproblemsFailed { count: table.len() });
        }
        Ok(table)
    }
}

/// One worker's lifetime: acquire the model once, drain the queue.
fn run_worker(
    worker: usize,
    problems: &[OptimizationProblem],
    cursor: &AtomicUsize,
    model: &Arc<dyn ResponseModel>,
    settings: &SolverSettings,
    progress: &PoolProgress,
) -> Vec<OptimizationResult> {
    let evaluator = ObjectiveEvaluator::new(Arc::clone(model));
    let mut completed = Vec::new();

    loop {
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let Some(problem) = problems.get(index) else {
            break;
        };

        progress.start();
        let result = solve_problem(worker, &evaluator, problem, settings);
        progress.finish(result.state);
        completed.push(result);
    }

    debug!(
        worker,
        solved = completed.len(),
        total_completed = progress.completed(),
        still_running = progress.running(),
        "Worker finished"
    );
    completed
}

/// `Pending -> Running -> terminal` for one problem. Never panics and never
/// returns early: every claimed problem yields exactly one result.
fn solve_problem(
    worker: usize,
    evaluator: &ObjectiveEvaluator,
    problem: &OptimizationProblem,
    settings: &SolverSettings,
) -> OptimizationResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        solver::solve(evaluator, problem, settings)
    }))
    .unwrap_or_else(|payload| Err(SubproblemFailure::WorkerPanic(panic_message(&payload))));

    match outcome {
        Ok(outcome) => {
            debug_assert!(ProblemState::Running.can_transition_to(outcome.state));
            debug!(
                worker,
                index = problem.index,
                timestamp = %problem.timestamp,
                state = %outcome.state,
                iterations = outcome.iterations,
                objective = outcome.objective,
                "Subproblem solved"
            );
            OptimizationResult {
                index: problem.index,
                timestamp: problem.timestamp,
                state: outcome.state,
                setpoints: Some(outcome.setpoints),
                objective: Some(outcome.objective),
                predicted_response: Some(outcome.prediction),
                historical_response: problem.historical_response,
                iterations: outcome.iterations,
                failure: None,
            }
        }
        Err(failure) => {
            warn!(
                worker,
                index = problem.index,
                timestamp = %problem.timestamp,
                error = %failure,
                "Subproblem failed"
            );
            OptimizationResult::failed(problem, failure)
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
