//! Result aggregation and the final result table
//!
//! Workers hand back results in completion order; the aggregator slots each
//! one by its input position so the table always comes out in the original
//! timestamp order, one row per dispatched problem. Rows that never arrive
//! are filled with failure sentinels.

use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::defaults::{TIMESTAMP_COLUMN, TIMESTAMP_FORMAT};
use crate::types::{OptimizationProblem, OptimizationResult, ProblemState, SubproblemFailure};

/// Collects per-problem results into input order.
pub struct ResultAggregator {
    slots: Vec<Option<OptimizationResult>>,
    expected: Vec<(NaiveDateTime, Option<f64>)>,
    duplicates: usize,
}

impl ResultAggregator {
    pub fn new(problems: &[OptimizationProblem]) -> Self {
        Self {
            slots: vec![None; problems.len()],
            expected: problems
                .iter()
                .map(|p| (p.timestamp, p.historical_response))
                .collect(),
            duplicates: 0,
        }
    }

    /// Record one result. The first result for an index wins.
    pub fn record(&mut self, result: OptimizationResult) {
        match self.slots.get_mut(result.index) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            Some(_) => {
                self.duplicates += 1;
                warn!(index = result.index, "Duplicate result ignored");
            }
            None => warn!(index = result.index, "Result for unknown subproblem ignored"),
        }
    }

    pub fn collected(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Assemble the table, filling uncollected rows with sentinels.
    pub fn finish(self, variables: Vec<String>) -> ResultTable {
        let mut missing = 0usize;
        let rows: Vec<OptimizationResult> = self
            .slots
            .into_iter()
            .zip(self.expected)
            .enumerate()
            .map(|(index, (slot, (timestamp, historical)))| {
                slot.unwrap_or_else(|| {
                    missing += 1;
                    OptimizationResult::sentinel(
                        index,
                        timestamp,
                        historical,
                        SubproblemFailure::NotCollected,
                    )
                })
            })
            .collect();

        if missing > 0 || self.duplicates > 0 {
            warn!(missing, duplicates = self.duplicates, "Result set was incomplete");
        }

        ResultTable {
            timestamp_column: TIMESTAMP_COLUMN.to_string(),
            variables,
            rows,
        }
    }
}

/// Per-state counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub converged: usize,
    pub budget_exhausted: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.converged + self.budget_exhausted + self.failed
    }
}

/// Optimized setpoints, one row per input timestamp, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    /// Header of the first output column; the history's index column name
    timestamp_column: String,
    variables: Vec<String>,
    rows: Vec<OptimizationResult>,
}

impl ResultTable {
    pub fn with_timestamp_column(mut self, name: impl Into<String>) -> Self {
        self.timestamp_column = name.into();
        self
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn rows(&self) -> &[OptimizationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        self.rows
            .iter()
            .fold(RunSummary::default(), |mut acc, row| {
                match row.state {
                    ProblemState::Converged => acc.converged += 1,
                    ProblemState::BudgetExhausted => acc.budget_exhausted += 1,
                    ProblemState::Failed | ProblemState::Pending | ProblemState::Running => {
                        acc.failed += 1;
                    }
                }
                acc
            })
    }

    pub fn all_failed(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(OptimizationResult::is_failed)
    }

    /// Write the table as CSV.
    ///
    /// Failed rows keep their timestamp and state but leave every numeric
    /// cell empty, the missing-value marker downstream readers expect.
    /// Header names holding a comma, quote or line break are quoted.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        let header: Vec<Cow<'_, str>> = std::iter::once(self.timestamp_column.as_str())
            .chain(self.variables.iter().map(String::as_str))
            .chain([
                "predicted_response",
                "historical_response",
                "objective",
                "state",
                "iterations",
            ])
            .map(escape_field)
            .collect();
        writeln!(out, "{}", header.join(","))?;

        for row in &self.rows {
            let mut fields = Vec::with_capacity(header.len());
            fields.push(row.timestamp.format(TIMESTAMP_FORMAT).to_string());
            match &row.setpoints {
                Some(values) => fields.extend(values.iter().map(f64::to_string)),
                None => fields.extend(std::iter::repeat(String::new()).take(self.variables.len())),
            }
            fields.push(cell(row.predicted_response));
            fields.push(cell(row.historical_response));
            fields.push(cell(row.objective));
            fields.push(row.state.to_string());
            fields.push(row.iterations.to_string());
            writeln!(out, "{}", fields.join(","))?;
        }
        out.flush()
    }

    /// Write to `path` atomically (temp file, then rename).
    pub fn save_csv(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("csv.tmp");
        {
            let file = std::fs::File::create(&tmp_path)?;
            self.write_csv(io::BufWriter::new(file))?;
        }
        std::fs::rename(&tmp_path, path)?;
        info!(path = %path.display(), rows = self.rows.len(), "Result table saved");
        Ok(())
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Quote a field for CSV output, doubling embedded quotes.
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
