//! End-to-End Run Test
//!
//! Writes a small historical log, a generated bounds file and a model file
//! to a temp directory, runs the whole pipeline and reads the result CSV
//! back.

use boiler_optimizer::optimization::BoundsPolicy;
use boiler_optimizer::{
    run_optimization, BoundsConfig, ConfigurationError, HistoricalTable, LinearResponseModel,
    OptimizationResult, OptimizerConfig, RunError, RunOptions, RunParameters, SolverSettings, WorkerPool,
};
use std::path::Path;
use std::sync::Arc;

const HISTORY: &str = "\
Date,FUEL OIL CONTROL,COMBUSTION AIR CONTROL,FEED WATER TEMP,RESPONSE
2022-01-25 00:00:00,41.2,63.0,118.4,201.7
2022-01-25 01:00:00,42.0,64.5,119.0,203.1
2022-01-25 02:00:00,43.5,61.0,120.2,205.0
2022-01-25 03:00:00,40.1,60.2,117.9,199.4
2022-01-25 04:00:00,39.8,62.7,118.1,198.8
2022-01-25 05:00:00,44.0,65.1,121.3,207.2
";

const MODEL: &str = r#"{
    "intercept": 50.0,
    "features": ["FUEL OIL CONTROL", "COMBUSTION AIR CONTROL", "FEED WATER TEMP"],
    "coefficients": [4.0, 1.0, 0.5],
    "quadratic": [-0.05, -0.01, 0.0]
}"#;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn options(config: &OptimizerConfig) -> RunOptions {
    RunOptions {
        params: config.run_parameters(),
        solver: config.solver_settings(),
        pool: WorkerPool::new(2, 2).unwrap(),
        response_column: config.run.response_column.clone(),
    }
}

fn generated_bounds(table: &HistoricalTable) -> BoundsConfig {
    BoundsConfig::generate_from_history(
        table,
        &["FUEL OIL CONTROL".to_string(), "COMBUSTION AIR CONTROL".to_string()],
        &[0.05, 0.1],
        &["FEED WATER TEMP".to_string()],
    )
    .unwrap()
}

#[test]
fn full_run_writes_one_row_per_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = write(dir.path(), "history.csv", HISTORY);
    let model_path = write(dir.path(), "model.json", MODEL);
    let bounds_path = dir.path().join("bounds.json");
    let output_path = dir.path().join("out").join("optimized.csv");

    let table = HistoricalTable::load(&history_path, "Date").unwrap();
    generated_bounds(&table).save_to_file(&bounds_path).unwrap();

    let bounds = BoundsConfig::load_from_file(&bounds_path).unwrap();
    assert_eq!(bounds.controllable[0].lo, 39.8);
    assert_eq!(bounds.controllable[0].hi, 44.0);

    let model = LinearResponseModel::load_from_file(&model_path).unwrap();
    let mut config = OptimizerConfig::default();
    config.run.trade_off = 0.5;

    let result = run_optimization(&table, &bounds, Arc::new(model), &options(&config)).unwrap();
    result.save_csv(&output_path).unwrap();

    let text = std::fs::read_to_string(&output_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Date,FUEL OIL CONTROL,COMBUSTION AIR CONTROL,predicted_response,historical_response,objective,state,iterations"
    );
    assert_eq!(lines.len(), 1 + table.len());
    assert!(lines[1].starts_with("2022-01-25 00:00:00,"));
    assert!(lines[6].starts_with("2022-01-25 05:00:00,"));
    assert!(lines[1].contains(",201.7,"));

    for row in result.rows() {
        assert!(!row.is_failed(), "row {} failed: {:?}", row.index, row.failure);
        let predicted = row.predicted_response.unwrap();
        let objective = row.objective.unwrap();
        // Moving costs something, so the score never beats the bare prediction
        assert!(objective >= -predicted - 1e-9);
    }
}

#[test]
fn trade_off_keeps_setpoints_closer_to_history() {
    let table = HistoricalTable::from_reader(HISTORY.as_bytes(), "inline", "Date").unwrap();
    let bounds = generated_bounds(&table);
    let model: LinearResponseModel = serde_json::from_str(MODEL).unwrap();
    let model = Arc::new(model);

    let run = |trade_off: f64| {
        let options = RunOptions {
            params: RunParameters {
                trade_off,
                max_iter: 200,
                bounds_policy: BoundsPolicy::default(),
            },
            solver: SolverSettings::default(),
            pool: WorkerPool::new(2, 2).unwrap(),
            response_column: "RESPONSE".to_string(),
        };
        run_optimization(&table, &bounds, model.clone(), &options).unwrap()
    };

    let free = run(0.0);
    let anchored = run(1000.0);

    let records = table
        .records(&bounds.controllable_names(), &bounds.noncontrollable, "RESPONSE")
        .unwrap();
    let moved = |rows: &[OptimizationResult]| -> f64 {
        rows.iter()
            .zip(&records)
            .flat_map(|(row, record)| {
                let setpoints = row.setpoints.clone().unwrap();
                setpoints
                    .into_iter()
                    .zip(record.controllable.clone())
                    .map(|(x, last)| (x - last).abs())
            })
            .sum()
    };

    assert!(moved(anchored.rows()) < moved(free.rows()));
}

#[test]
fn missing_context_column_is_fatal_before_dispatch() {
    let table = HistoricalTable::from_reader(HISTORY.as_bytes(), "inline", "Date").unwrap();
    let mut bounds = generated_bounds(&table);
    bounds.noncontrollable.push("DRUM PRESSURE".to_string());

    let model = LinearResponseModel::new(
        0.0,
        vec![
            "FUEL OIL CONTROL".into(),
            "COMBUSTION AIR CONTROL".into(),
            "FEED WATER TEMP".into(),
            "DRUM PRESSURE".into(),
        ],
        vec![1.0, 1.0, 0.0, 0.0],
    )
    .unwrap();

    let err = run_optimization(
        &table,
        &bounds,
        Arc::new(model),
        &options(&OptimizerConfig::default()),
    )
    .unwrap_err();
    match err {
        RunError::Configuration(ConfigurationError::MissingColumns(cols)) => {
            assert_eq!(cols, vec!["DRUM PRESSURE"]);
        }
        other => panic!("expected missing columns, got {other}"),
    }
}

#[test]
fn output_reloads_with_custom_index_and_quoted_tags() {
    let history = "\
Time,\"FLOW, STEAM\",FEED WATER TEMP,RESPONSE,SHIFT
2022-01-25 00:00:00.000,10.0,118.4,201.7,A
2022-01-25 01:00:00.000,12.0,119.0,203.1,B
2022-01-25 02:00:00.000,11.0,120.2,205.0,A
";
    let dir = tempfile::tempdir().unwrap();
    let history_path = write(dir.path(), "history.csv", history);
    let output_path = dir.path().join("optimized.csv");

    let table = HistoricalTable::load(&history_path, "Time").unwrap();
    assert_eq!(table.len(), 3);

    let bounds = BoundsConfig::generate_from_history(
        &table,
        &["FLOW, STEAM".to_string()],
        &[0.1],
        &["FEED WATER TEMP".to_string()],
    )
    .unwrap();
    let model = LinearResponseModel::new(
        0.0,
        vec!["FLOW, STEAM".into(), "FEED WATER TEMP".into()],
        vec![1.0, 0.0],
    )
    .unwrap();

    let result = run_optimization(
        &table,
        &bounds,
        Arc::new(model),
        &options(&OptimizerConfig::default()),
    )
    .unwrap();
    result.save_csv(&output_path).unwrap();

    let text = std::fs::read_to_string(&output_path).unwrap();
    assert!(text.starts_with("Time,\"FLOW, STEAM\",predicted_response,"), "{text}");

    let reloaded = HistoricalTable::load(&output_path, "Time").unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.timestamps(), table.timestamps());
    assert_eq!(reloaded.columns()[0], "FLOW, STEAM");
}
