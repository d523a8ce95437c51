//! Subproblem builder: one immutable optimization task per timestamp

use rayon::prelude::*;
use tracing::info;

use super::bounds::{bounds_for_record, BoundsPolicy};
use crate::config::BoundsConfig;
use crate::error::ConfigurationError;
use crate::history::HistoricalTable;
use crate::types::{ControlVariable, OptimizationProblem, TimestepRecord};

/// Run-level inputs shared by every subproblem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParameters {
    /// Trade-off scalar `c`
    pub trade_off: f64,
    /// Iteration budget per subproblem
    pub max_iter: u64,
    pub bounds_policy: BoundsPolicy,
}

impl RunParameters {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();
        if !self.trade_off.is_finite() || self.trade_off < 0.0 {
            errors.push(format!("trade-off c must be finite and >= 0, got {}", self.trade_off));
        }
        if self.max_iter == 0 {
            errors.push("iteration budget must be > 0".to_string());
        }
        let policy = &self.bounds_policy;
        if !(policy.lower_clip_epsilon.is_finite() && policy.lower_clip_epsilon > 0.0) {
            errors.push(format!(
                "lower clip epsilon must be > 0, got {}",
                policy.lower_clip_epsilon
            ));
        }
        if !(policy.upper_widening.is_finite() && policy.upper_widening > 0.0) {
            errors.push(format!(
                "upper widening must be > 0, got {}",
                policy.upper_widening
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Parameter(errors.join("; ")))
        }
    }
}

/// Packages timestep records into optimization problems.
///
/// Every shape check happens here, before any worker is started.
pub struct SubproblemBuilder<'a> {
    variables: &'a [ControlVariable],
    context_columns: &'a [String],
    params: RunParameters,
}

impl<'a> SubproblemBuilder<'a> {
    pub fn new(config: &'a BoundsConfig, params: RunParameters) -> Result<Self, ConfigurationError> {
        config.validate()?;
        params.validate()?;
        Ok(Self {
            variables: &config.controllable,
            context_columns: &config.noncontrollable,
            params,
        })
    }

    /// Split the historical table into records, failing on missing columns.
    pub fn extract_records(
        &self,
        table: &HistoricalTable,
        response_column: &str,
    ) -> Result<Vec<TimestepRecord>, ConfigurationError> {
        let controllable: Vec<String> = self.variables.iter().map(|v| v.name.clone()).collect();
        table.records(&controllable, self.context_columns, response_column)
    }

    /// One problem per record, in record order.
    pub fn build(
        &self,
        records: &[TimestepRecord],
    ) -> Result<Vec<OptimizationProblem>, ConfigurationError> {
        for record in records {
            self.check_shape(record)?;
        }

        let spans: Vec<f64> = self.variables.iter().map(ControlVariable::span).collect();
        let problems: Vec<OptimizationProblem> = records
            .par_iter()
            .enumerate()
            .map(|(index, record)| OptimizationProblem {
                index,
                timestamp: record.timestamp,
                initial: record.controllable.clone(),
                bounds: bounds_for_record(
                    &record.controllable,
                    self.variables,
                    &self.params.bounds_policy,
                ),
                spans: spans.clone(),
                context: record.context.clone(),
                trade_off: self.params.trade_off,
                max_iter: self.params.max_iter,
                historical_response: record.response,
            })
            .collect();

        info!(
            problems = problems.len(),
            controllable = self.variables.len(),
            context = self.context_columns.len(),
            trade_off = self.params.trade_off,
            max_iter = self.params.max_iter,
            "Subproblems built"
        );
        Ok(problems)
    }

    fn check_shape(&self, record: &TimestepRecord) -> Result<(), ConfigurationError> {
        if record.controllable.len() < self.variables.len() {
            return Err(ConfigurationError::MissingColumns(
                self.variables[record.controllable.len()..]
                    .iter()
                    .map(|v| v.name.clone())
                    .collect(),
            ));
        }
        if record.context.len() < self.context_columns.len() {
            return Err(ConfigurationError::MissingColumns(
                self.context_columns[record.context.len()..].to_vec(),
            ));
        }
        if record.controllable.len() > self.variables.len()
            || record.context.len() > self.context_columns.len()
        {
            return Err(ConfigurationError::Parameter(format!(
                "record at {} has {} controllable and {} context values, expected {} and {}",
                record.timestamp,
                record.controllable.len(),
                record.context.len(),
                self.variables.len(),
                self.context_columns.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> BoundsConfig {
        BoundsConfig {
            controllable: vec![
                ControlVariable { name: "X".into(), lo: 0.0, hi: 100.0, rate: 0.1 },
                ControlVariable { name: "Y".into(), lo: 10.0, hi: 20.0, rate: 0.0 },
            ],
            noncontrollable: vec!["ctx".into()],
        }
    }

    fn params() -> RunParameters {
        RunParameters {
            trade_off: 0.5,
            max_iter: 100,
            bounds_policy: BoundsPolicy::default(),
        }
    }

    fn record(hour: u32, x: f64, y: f64) -> TimestepRecord {
        TimestepRecord {
            timestamp: NaiveDate::from_ymd_opt(2022, 6, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            controllable: vec![x, y],
            context: vec![3.0],
            response: Some(1.0),
        }
    }

    #[test]
    fn one_problem_per_record_in_order() {
        let cfg = config();
        let builder = SubproblemBuilder::new(&cfg, params()).unwrap();
        let records: Vec<_> = (0..24).map(|h| record(h, 50.0, 20.0)).collect();
        let problems = builder.build(&records).unwrap();

        assert_eq!(problems.len(), 24);
        for (i, (p, r)) in problems.iter().zip(&records).enumerate() {
            assert_eq!(p.index, i);
            assert_eq!(p.timestamp, r.timestamp);
            assert_eq!(p.max_iter, 100);
            assert_eq!(p.spans, vec![100.0, 10.0]);
        }
    }

    #[test]
    fn bounds_follow_last_values() {
        let cfg = config();
        let builder = SubproblemBuilder::new(&cfg, params()).unwrap();
        let problems = builder.build(&[record(0, 50.0, 20.0)]).unwrap();
        let b = &problems[0].bounds;
        assert!((b[0].min_b - 45.0).abs() < 1e-12);
        assert!((b[0].max_b - 55.001).abs() < 1e-12);
        // Zero rate on the global upper bound still has positive width
        assert!(b[1].is_valid());
    }

    #[test]
    fn short_record_is_missing_columns() {
        let cfg = config();
        let builder = SubproblemBuilder::new(&cfg, params()).unwrap();
        let mut bad = record(0, 1.0, 15.0);
        bad.controllable.pop();
        let err = builder.build(&[record(1, 1.0, 15.0), bad]).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingColumns(ref c) if c == &["Y"]));
    }

    #[test]
    fn negative_trade_off_rejected() {
        let cfg = config();
        let mut p = params();
        p.trade_off = -1.0;
        assert!(SubproblemBuilder::new(&cfg, p).is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let cfg = config();
        let mut p = params();
        p.max_iter = 0;
        assert!(SubproblemBuilder::new(&cfg, p).is_err());
    }
}
