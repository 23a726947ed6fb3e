//! Multi-model comparison runs.
//!
//! Builds the schedule once and runs every requested model's backtest
//! independently on the rayon pool. A failing model is recorded as an error
//! in its slot and never affects the other models. The benchmark is handled
//! the same way.

use crate::domain::backtest::{
    benchmark_path, run_backtest, BacktestConfig, BacktestResult, PortfolioPath, WeightProvider,
};
use crate::domain::error::PortoptError;
use crate::domain::metrics::Metrics;
use crate::domain::optimizer::{optimize, Constraints, OptimizationModel, OptimizationResult};
use crate::domain::returns::ReturnMatrix;
use crate::domain::schedule::{build_schedule, RebalanceFrequency, RebalanceSchedule, ScheduleAnchor};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_COMPARED_MODELS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub models: Vec<OptimizationModel>,
    pub constraints: Constraints,
    pub frequency: RebalanceFrequency,
    pub anchor: ScheduleAnchor,
    /// Trailing rows per training window; `None` uses all history.
    pub lookback: Option<usize>,
    pub min_history: usize,
    pub backtest: BacktestConfig,
}

impl Default for ComparisonRequest {
    fn default() -> Self {
        ComparisonRequest {
            models: vec![OptimizationModel::EqualWeight],
            constraints: Constraints::default(),
            frequency: RebalanceFrequency::Quarterly,
            anchor: ScheduleAnchor::FirstTradingDate,
            lookback: None,
            min_history: 60,
            backtest: BacktestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    pub model: OptimizationModel,
    pub backtest: BacktestResult,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRun {
    pub path: PortfolioPath,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub schedule: RebalanceSchedule,
    pub runs: BTreeMap<OptimizationModel, Result<ModelRun, PortoptError>>,
    pub benchmark: Option<Result<BenchmarkRun, PortoptError>>,
}

impl ComparisonResult {
    pub fn successful(&self) -> impl Iterator<Item = &ModelRun> {
        self.runs.values().filter_map(|run| run.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (OptimizationModel, &PortoptError)> {
        self.runs
            .iter()
            .filter_map(|(model, run)| run.as_ref().err().map(|e| (*model, e)))
    }

    /// The benchmark run, if one was requested and it succeeded.
    pub fn benchmark_run(&self) -> Option<&BenchmarkRun> {
        self.benchmark.as_ref().and_then(|b| b.as_ref().ok())
    }
}

/// 1..=3 distinct models.
pub fn validate_models(models: &[OptimizationModel]) -> Result<(), PortoptError> {
    if models.is_empty() {
        return Err(PortoptError::invalid_config(
            "optimizer",
            "models",
            "at least one model is required",
        ));
    }
    if models.len() > MAX_COMPARED_MODELS {
        return Err(PortoptError::invalid_config(
            "optimizer",
            "models",
            format!(
                "at most {MAX_COMPARED_MODELS} models can be compared, got {}",
                models.len()
            ),
        ));
    }
    let unique: BTreeSet<_> = models.iter().collect();
    if unique.len() != models.len() {
        return Err(PortoptError::invalid_config(
            "optimizer",
            "models",
            "models must not repeat",
        ));
    }
    Ok(())
}

fn run_model(
    matrix: &ReturnMatrix,
    schedule: &RebalanceSchedule,
    model: OptimizationModel,
    request: &ComparisonRequest,
) -> Result<ModelRun, PortoptError> {
    let provider = WeightProvider::Optimized {
        model,
        constraints: request.constraints.clone(),
        lookback: request.lookback,
        min_history: request.min_history,
    };
    let backtest = run_backtest(matrix, schedule, &provider, &request.backtest)?;
    let metrics = Metrics::compute(&backtest.path, request.constraints.risk_free_rate);
    Ok(ModelRun {
        model,
        backtest,
        metrics,
    })
}

/// Backtest every requested model over `matrix`, plus an optional benchmark.
pub fn run_comparison(
    matrix: &ReturnMatrix,
    request: &ComparisonRequest,
    benchmark: Option<&ReturnMatrix>,
) -> Result<ComparisonResult, PortoptError> {
    validate_models(&request.models)?;
    let schedule = build_schedule(matrix.dates(), request.frequency, request.anchor)?;
    tracing::info!(
        models = request.models.len(),
        assets = matrix.asset_count(),
        dates = matrix.date_count(),
        rebalances = schedule.len(),
        frequency = %request.frequency,
        "Starting comparison run"
    );

    let runs: BTreeMap<_, _> = request
        .models
        .par_iter()
        .map(|&model| {
            let outcome = run_model(matrix, &schedule, model, request);
            match &outcome {
                Ok(run) => tracing::info!(
                    model = model.key(),
                    final_value = run.backtest.path.final_value().unwrap_or(1.0),
                    sharpe = run.metrics.sharpe_ratio,
                    "Model backtest finished"
                ),
                Err(e) => tracing::warn!(model = model.key(), error = %e, "Model backtest failed"),
            }
            (model, outcome)
        })
        .collect();

    let benchmark = benchmark.map(|bench| {
        let outcome = benchmark_path(bench, &request.backtest).map(|path| {
            let metrics = Metrics::compute(&path, request.constraints.risk_free_rate);
            BenchmarkRun { path, metrics }
        });
        match &outcome {
            Ok(run) => tracing::debug!(points = run.path.len(), "Benchmark path computed"),
            Err(e) => tracing::warn!(error = %e, "Benchmark path failed"),
        }
        outcome
    });

    Ok(ComparisonResult {
        schedule,
        runs,
        benchmark,
    })
}

/// Weights of each model on the window ending at the last trading date on or
/// before `date`.
pub fn optimize_at(
    matrix: &ReturnMatrix,
    date: NaiveDate,
    models: &[OptimizationModel],
    constraints: &Constraints,
    lookback: Option<usize>,
) -> Result<BTreeMap<OptimizationModel, Result<OptimizationResult, PortoptError>>, PortoptError> {
    validate_models(models)?;
    let window = matrix
        .window_until(date, lookback)
        .ok_or_else(|| PortoptError::Data {
            reason: format!("no trading dates on or before {date}"),
        })?;
    tracing::info!(
        cutoff = %window.end,
        assets = window.asset_count(),
        observations = window.observations(),
        "Optimizing on window"
    );

    Ok(models
        .par_iter()
        .map(|&model| {
            let outcome = optimize(&window, model, constraints);
            if let Err(e) = &outcome {
                tracing::warn!(model = model.key(), error = %e, "Optimization failed");
            }
            (model, outcome)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::ReturnRecord;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_matrix(days: usize) -> ReturnMatrix {
        let start = d(2020, 1, 1);
        let mut records = Vec::new();
        for t in 0..days {
            let date = start + chrono::Duration::days(t as i64);
            for (k, asset) in ["AAA", "BBB", "CCC"].iter().enumerate() {
                let phase = (t as f64 * (0.9 + 0.37 * k as f64)).sin();
                let value = 0.0005 * (k as f64 + 1.0) + 0.008 * (1.0 + 0.4 * k as f64) * phase;
                records.push(ReturnRecord::new(date, *asset, value));
            }
        }
        ReturnMatrix::from_records(&records).unwrap()
    }

    #[test]
    fn rejects_empty_model_list() {
        let err = validate_models(&[]).unwrap_err();
        assert!(matches!(err, PortoptError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_more_than_three_models() {
        let models = [
            OptimizationModel::EqualWeight,
            OptimizationModel::RiskParity,
            OptimizationModel::MaxSharpe,
            OptimizationModel::MinimumVariance,
        ];
        assert!(matches!(
            validate_models(&models),
            Err(PortoptError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn rejects_duplicates() {
        let models = [OptimizationModel::EqualWeight, OptimizationModel::EqualWeight];
        assert!(validate_models(&models).is_err());
    }

    #[test]
    fn runs_every_model() {
        let matrix = sample_matrix(300);
        let request = ComparisonRequest {
            models: vec![
                OptimizationModel::EqualWeight,
                OptimizationModel::MinimumVariance,
                OptimizationModel::HierarchicalRiskParity,
            ],
            frequency: RebalanceFrequency::Monthly,
            ..ComparisonRequest::default()
        };
        let result = run_comparison(&matrix, &request, None).unwrap();
        assert_eq!(result.runs.len(), 3);
        for run in result.successful() {
            assert_eq!(run.backtest.path.len(), matrix.date_count());
        }
        assert_eq!(result.failures().count(), 0);
        assert!(result.benchmark.is_none());
    }

    #[test]
    fn one_failing_model_does_not_affect_others() {
        let matrix = sample_matrix(200);
        let request = ComparisonRequest {
            models: vec![OptimizationModel::EqualWeight, OptimizationModel::MaxSharpe],
            constraints: Constraints {
                // no asset beats a 100% risk-free rate
                risk_free_rate: 1.0,
                ..Constraints::default()
            },
            min_history: 20,
            frequency: RebalanceFrequency::Monthly,
            ..ComparisonRequest::default()
        };
        let result = run_comparison(&matrix, &request, None).unwrap();
        assert!(matches!(
            result.runs[&OptimizationModel::MaxSharpe],
            Err(PortoptError::OptimizationFailure { .. })
        ));
        let ew = result.runs[&OptimizationModel::EqualWeight].as_ref().unwrap();
        assert_eq!(ew.backtest.path.len(), matrix.date_count());
        assert_eq!(result.failures().count(), 1);
    }

    #[test]
    fn matches_direct_backtest() {
        let matrix = sample_matrix(150);
        let request = ComparisonRequest {
            models: vec![OptimizationModel::RiskParity],
            min_history: 30,
            ..ComparisonRequest::default()
        };
        let result = run_comparison(&matrix, &request, None).unwrap();
        let schedule = build_schedule(matrix.dates(), request.frequency, request.anchor).unwrap();
        let direct = run_model(&matrix, &schedule, OptimizationModel::RiskParity, &request).unwrap();
        assert_eq!(
            result.runs[&OptimizationModel::RiskParity].as_ref().unwrap(),
            &direct
        );
    }

    #[test]
    fn includes_benchmark() {
        let matrix = sample_matrix(60);
        let bench = ReturnMatrix::from_records(
            &matrix
                .dates()
                .iter()
                .map(|date| ReturnRecord::new(*date, "BENCH", 0.001))
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let result = run_comparison(&matrix, &ComparisonRequest::default(), Some(&bench)).unwrap();
        let benchmark = result.benchmark_run().unwrap();
        assert_eq!(benchmark.path.len(), 60);
        assert!(benchmark.metrics.total_return > 0.0);
    }

    #[test]
    fn failed_benchmark_keeps_model_runs() {
        let matrix = sample_matrix(60);
        let empty = ReturnMatrix::from_records(&[]).unwrap();
        let request = ComparisonRequest {
            min_history: 20,
            ..ComparisonRequest::default()
        };
        let result = run_comparison(&matrix, &request, Some(&empty)).unwrap();

        assert_eq!(result.benchmark, Some(Err(PortoptError::EmptySchedule)));
        assert!(result.benchmark_run().is_none());
        let ew = result.runs[&OptimizationModel::EqualWeight].as_ref().unwrap();
        assert_eq!(ew.backtest.path.len(), 60);
    }

    #[test]
    fn optimize_at_uses_window_until_date() {
        let matrix = sample_matrix(120);
        let models = [OptimizationModel::EqualWeight, OptimizationModel::MaxSharpe];
        let out =
            optimize_at(&matrix, d(2020, 3, 1), &models, &Constraints::default(), None).unwrap();
        assert_eq!(out.len(), 2);
        let ew = out[&OptimizationModel::EqualWeight].as_ref().unwrap();
        assert_eq!(ew.weights.weights(), &[1.0 / 3.0; 3]);
    }

    #[test]
    fn optimize_at_before_data_is_error() {
        let matrix = sample_matrix(30);
        let err = optimize_at(
            &matrix,
            d(2019, 1, 1),
            &[OptimizationModel::EqualWeight],
            &Constraints::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PortoptError::Data { .. }));
    }
}
