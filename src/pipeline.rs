//! End-to-end optimization run
//!
//! Loaded inputs go in, an ordered [`ResultTable`] comes out. Every check
//! that can reject the run (model layout, bounds, run parameters, missing
//! columns) happens before the worker pool starts.

use std::sync::Arc;
use tracing::info;

use crate::config::BoundsConfig;
use crate::error::RunError;
use crate::history::HistoricalTable;
use crate::model::{check_feature_layout, ResponseModel};
use crate::optimization::{
    ResultTable, RunParameters, Scheduler, SolverSettings, SubproblemBuilder, WorkerPool,
};

/// Everything a run needs besides its data.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub params: RunParameters,
    pub solver: SolverSettings,
    pub pool: WorkerPool,
    pub response_column: String,
}

/// Optimize every row of `table` and return the results in row order.
pub fn run_optimization(
    table: &HistoricalTable,
    bounds: &BoundsConfig,
    model: Arc<dyn ResponseModel>,
    options: &RunOptions,
) -> Result<ResultTable, RunError> {
    let controllable = bounds.controllable_names();
    check_feature_layout(model.as_ref(), &controllable, &bounds.noncontrollable)?;

    let builder = SubproblemBuilder::new(bounds, options.params)?;
    let records = builder.extract_records(table, &options.response_column)?;
    let problems = builder.build(&records)?;

    info!(
        source = %table.source(),
        problems = problems.len(),
        workers = options.pool.workers(),
        trade_off = options.params.trade_off,
        max_iter = options.params.max_iter,
        "Starting optimization run"
    );

    let results = Scheduler::new(options.pool, options.solver).run(&problems, model, controllable)?;
    Ok(results.with_timestamp_column(table.timestamp_column()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::model::LinearResponseModel;
    use crate::optimization::BoundsPolicy;

    const CSV: &str = "Date,X,CTX,RESPONSE\n\
                       2022-01-01 00:00:00,50,1,10\n\
                       2022-01-01 01:00:00,60,2,11\n\
                       2022-01-01 02:00:00,70,3,12\n";

    fn bounds() -> BoundsConfig {
        BoundsConfig::from_json_str(
            r#"{"controllable": {"X": {"rate": 0.1, "bounds": [0.0, 100.0]}},
                "noncontrollable": ["CTX"]}"#,
        )
        .unwrap()
    }

    fn options() -> RunOptions {
        RunOptions {
            params: RunParameters {
                trade_off: 0.0,
                max_iter: 200,
                bounds_policy: BoundsPolicy::default(),
            },
            solver: SolverSettings::default(),
            pool: WorkerPool::new(2, 2).unwrap(),
            response_column: "RESPONSE".to_string(),
        }
    }

    #[test]
    fn increasing_model_pushes_to_upper_bound() {
        let table = HistoricalTable::from_reader(CSV.as_bytes(), "inline", "Date").unwrap();
        let model = LinearResponseModel::new(0.0, vec!["X".into(), "CTX".into()], vec![1.0, 0.0])
            .unwrap();
        let result = run_optimization(&table, &bounds(), Arc::new(model), &options()).unwrap();

        assert_eq!(result.len(), 3);
        for (row, last) in result.rows().iter().zip([50.0, 60.0, 70.0]) {
            let x = row.setpoints.as_ref().unwrap()[0];
            let upper = last * 1.1 + 1e-3;
            assert!(x <= upper + 1e-9, "{x} above {upper}");
            assert!(x > last, "{x} did not move up from {last}");
        }
        assert_eq!(result.rows()[2].historical_response, Some(12.0));
    }

    #[test]
    fn output_header_follows_history_index_column() {
        let csv = CSV.replacen("Date", "Timestamp", 1);
        let table = HistoricalTable::from_reader(csv.as_bytes(), "inline", "Timestamp").unwrap();
        let model = LinearResponseModel::new(0.0, vec!["X".into(), "CTX".into()], vec![1.0, 0.0])
            .unwrap();
        let result = run_optimization(&table, &bounds(), Arc::new(model), &options()).unwrap();
        assert_eq!(result.timestamp_column(), "Timestamp");

        let mut buf = Vec::new();
        result.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Timestamp,X,predicted_response,"), "{text}");
    }

    #[test]
    fn feature_mismatch_stops_before_dispatch() {
        let table = HistoricalTable::from_reader(CSV.as_bytes(), "inline", "Date").unwrap();
        let model = LinearResponseModel::new(0.0, vec!["CTX".into(), "X".into()], vec![1.0, 0.0])
            .unwrap();
        let err = run_optimization(&table, &bounds(), Arc::new(model), &options()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Configuration(ConfigurationError::ModelMismatch(_))
        ));
    }
}
