//! Backtest engine.
//!
//! Compounds daily returns against the weight vector in effect for each
//! period of a rebalance schedule and produces the cumulative value path.
//! The path starts at 1.0 on the first trading date; every later value is
//! `value[t-1] * (1 + r_t)`.

use crate::domain::error::PortoptError;
use crate::domain::linalg::dot;
use crate::domain::optimizer::{optimize, Constraints, OptimizationModel, TRADING_DAYS_PER_YEAR};
use crate::domain::returns::ReturnMatrix;
use crate::domain::schedule::{build_schedule, RebalanceFrequency, RebalanceSchedule, ScheduleAnchor};
use crate::domain::weights::WeightVector;
use chrono::NaiveDate;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestConfig {
    /// Annual rate added to every daily portfolio return (rate / 252).
    pub risk_free_overlay: Option<f64>,
}

impl BacktestConfig {
    pub fn daily_overlay(&self) -> f64 {
        self.risk_free_overlay
            .map_or(0.0, |rate| rate / TRADING_DAYS_PER_YEAR)
    }
}

/// Dated weight vectors, ordered by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightHistory {
    entries: Vec<(NaiveDate, WeightVector)>,
}

impl WeightHistory {
    pub fn new(mut entries: Vec<(NaiveDate, WeightVector)>) -> Result<Self, PortoptError> {
        entries.sort_by_key(|(date, _)| *date);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(PortoptError::Data {
                reason: format!("two weight vectors dated {}", pair[0].0),
            });
        }
        Ok(Self { entries })
    }

    /// Most recent vector dated on or before `date`.
    pub fn effective_at(&self, date: NaiveDate) -> Option<&WeightVector> {
        let idx = self.entries.partition_point(|(d, _)| *d <= date);
        idx.checked_sub(1).map(|i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &WeightVector)> {
        self.entries.iter().map(|(d, w)| (*d, w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of the weight vector at each rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightProvider {
    Fixed(WeightVector),
    History(WeightHistory),
    /// Re-optimize on the trailing window ending at each rebalance date.
    /// Windows with fewer than `min_history` rows have no vector yet.
    Optimized {
        model: OptimizationModel,
        constraints: Constraints,
        lookback: Option<usize>,
        min_history: usize,
    },
}

impl WeightProvider {
    fn weights_at(
        &self,
        matrix: &ReturnMatrix,
        date_idx: usize,
    ) -> Result<Option<WeightVector>, PortoptError> {
        match self {
            WeightProvider::Fixed(weights) => Ok(Some(weights.clone())),
            WeightProvider::History(history) => {
                Ok(history.effective_at(matrix.dates()[date_idx]).cloned())
            }
            WeightProvider::Optimized {
                model,
                constraints,
                lookback,
                min_history,
            } => {
                let window = matrix.window(date_idx, *lookback);
                if window.observations() < (*min_history).max(2) {
                    return Ok(None);
                }
                optimize(&window, *model, constraints).map(|result| Some(result.weights))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Cumulative value per trading date. Only the engine builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPath {
    points: Vec<PathPoint>,
}

impl PortfolioPath {
    pub(crate) fn from_points(points: Vec<PathPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Simple returns between consecutive points.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| {
                if w[0].value != 0.0 {
                    w[1].value / w[0].value - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceRecord {
    /// Period start; the weights apply to the following trading dates.
    pub date: NaiveDate,
    pub weights: WeightVector,
    /// True when no vector was available and equal weight was used.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub path: PortfolioPath,
    pub rebalances: Vec<RebalanceRecord>,
}

/// Run a backtest over every trading date of `matrix`.
pub fn run_backtest(
    matrix: &ReturnMatrix,
    schedule: &RebalanceSchedule,
    provider: &WeightProvider,
    config: &BacktestConfig,
) -> Result<BacktestResult, PortoptError> {
    if matrix.is_empty() || schedule.is_empty() {
        return Err(PortoptError::EmptySchedule);
    }
    let last_idx = matrix.date_count() - 1;

    let mut boundaries = Vec::with_capacity(schedule.len() + 2);
    boundaries.push(0);
    for date in schedule.dates() {
        let idx = matrix.date_index(*date).ok_or_else(|| PortoptError::MissingData {
            asset: "calendar".into(),
            reason: format!("rebalance date {date} is not a trading date"),
        })?;
        boundaries.push(idx);
    }
    boundaries.push(last_idx);
    boundaries.sort_unstable();
    boundaries.dedup();

    let universe = matrix.assets();
    let overlay = config.daily_overlay();
    let dates = matrix.dates();

    let mut points = Vec::with_capacity(matrix.date_count());
    points.push(PathPoint {
        date: dates[0],
        value: 1.0,
    });
    let mut rebalances = Vec::with_capacity(boundaries.len());
    let mut value = 1.0;

    for period in boundaries.windows(2) {
        let (start, end) = (period[0], period[1]);
        let (weights, fallback) = match provider.weights_at(matrix, start)? {
            Some(weights) => (weights, false),
            None => (WeightVector::equal(universe)?, true),
        };
        let dense = weights.reindex(universe)?;

        for t in (start + 1)..=end {
            let r = dot(&matrix.row_filled(t), &dense) + overlay;
            value *= 1.0 + r;
            if !value.is_finite() {
                return Err(PortoptError::NumericalOverflow {
                    date: dates[t].to_string(),
                });
            }
            points.push(PathPoint {
                date: dates[t],
                value,
            });
        }
        rebalances.push(RebalanceRecord {
            date: dates[start],
            weights,
            fallback,
        });
    }

    Ok(BacktestResult {
        path: PortfolioPath::from_points(points),
        rebalances,
    })
}

/// Equal-weight path over a benchmark matrix with no rebalancing events.
pub fn benchmark_path(
    benchmark: &ReturnMatrix,
    config: &BacktestConfig,
) -> Result<PortfolioPath, PortoptError> {
    let schedule = build_schedule(
        benchmark.dates(),
        RebalanceFrequency::None,
        ScheduleAnchor::FirstTradingDate,
    )?;
    let provider = WeightProvider::Fixed(WeightVector::equal(benchmark.assets())?);
    run_backtest(benchmark, &schedule, &provider, config).map(|result| result.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::ReturnRecord;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn single_asset() -> ReturnMatrix {
        let dates = vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4), d(2024, 1, 5)];
        ReturnMatrix::from_columns(
            dates,
            vec![("SPY".into(), vec![0.0, 0.01, -0.02, 0.03])],
        )
        .unwrap()
    }

    fn two_assets() -> ReturnMatrix {
        let dates = (0..6).map(|i| d(2024, 3, 4 + i)).collect();
        ReturnMatrix::from_columns(
            dates,
            vec![
                ("A".into(), vec![0.0, 0.02, 0.01, -0.01, 0.03, 0.00]),
                ("B".into(), vec![0.0, -0.01, 0.00, 0.02, -0.02, 0.01]),
            ],
        )
        .unwrap()
    }

    fn none_schedule(matrix: &ReturnMatrix) -> RebalanceSchedule {
        build_schedule(
            matrix.dates(),
            RebalanceFrequency::None,
            ScheduleAnchor::FirstTradingDate,
        )
        .unwrap()
    }

    #[test]
    fn single_asset_compounding() {
        let matrix = single_asset();
        let provider =
            WeightProvider::Fixed(WeightVector::new(vec!["SPY".into()], vec![1.0]).unwrap());
        let result = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &provider,
            &BacktestConfig::default(),
        )
        .unwrap();
        let expected = [1.0, 1.01, 0.9898, 1.019494];
        assert_eq!(result.path.len(), 4);
        for (got, want) in result.path.values().iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert_eq!(result.path.dates(), matrix.dates());
        assert_eq!(result.rebalances.len(), 1);
        assert!(!result.rebalances[0].fallback);
    }

    #[test]
    fn empty_matrix_is_empty_schedule() {
        let matrix = ReturnMatrix::from_records(&[]).unwrap();
        let schedule = build_schedule(
            &[d(2024, 1, 2)],
            RebalanceFrequency::None,
            ScheduleAnchor::FirstTradingDate,
        )
        .unwrap();
        let err = run_backtest(
            &matrix,
            &schedule,
            &WeightProvider::History(WeightHistory::default()),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, PortoptError::EmptySchedule);
    }

    #[test]
    fn overlay_adds_daily_rate() {
        let matrix = single_asset();
        let provider =
            WeightProvider::Fixed(WeightVector::new(vec!["SPY".into()], vec![1.0]).unwrap());
        let config = BacktestConfig {
            risk_free_overlay: Some(0.02),
        };
        let result = run_backtest(&matrix, &none_schedule(&matrix), &provider, &config).unwrap();
        let rf = 0.02 / 252.0;
        assert_relative_eq!(result.path.values()[1], 1.01 + rf, epsilon = 1e-12);
    }

    #[test]
    fn no_vector_falls_back_to_equal_weight() {
        let matrix = two_assets();
        let result = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &WeightProvider::History(WeightHistory::default()),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert!(result.rebalances[0].fallback);
        assert_relative_eq!(result.path.values()[1], 1.0 + 0.5 * 0.02 - 0.5 * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn history_uses_latest_vector_at_or_before_period_start() {
        let matrix = two_assets();
        let all_a = WeightVector::new(vec!["A".into(), "B".into()], vec![1.0, 0.0]).unwrap();
        let all_b = WeightVector::new(vec!["A".into(), "B".into()], vec![0.0, 1.0]).unwrap();
        let history = WeightHistory::new(vec![
            (d(2024, 3, 6), all_b.clone()),
            (d(2024, 3, 1), all_a.clone()),
        ])
        .unwrap();
        let schedule =
            RebalanceSchedule::from_dates(vec![d(2024, 3, 4), d(2024, 3, 6), d(2024, 3, 9)]);
        let result = run_backtest(
            &matrix,
            &schedule,
            &WeightProvider::History(history),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.rebalances[0].weights, all_a);
        assert_eq!(result.rebalances[1].weights, all_b);
        let v = result.path.values();
        assert_relative_eq!(v[2], 1.02 * 1.01, epsilon = 1e-12);
        assert_relative_eq!(v[3], 1.02 * 1.01 * 1.02, epsilon = 1e-12);
    }

    #[test]
    fn missing_returns_count_as_zero() {
        let records = vec![
            ReturnRecord::new(d(2024, 1, 2), "A", 0.0),
            ReturnRecord::new(d(2024, 1, 2), "B", 0.0),
            ReturnRecord::new(d(2024, 1, 3), "A", 0.04),
        ];
        let matrix = ReturnMatrix::from_records(&records).unwrap();
        let result = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &WeightProvider::History(WeightHistory::default()),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_relative_eq!(result.path.values()[1], 1.02, epsilon = 1e-12);
    }

    #[test]
    fn weight_outside_universe_is_missing_data() {
        let matrix = single_asset();
        let provider =
            WeightProvider::Fixed(WeightVector::new(vec!["QQQ".into()], vec![1.0]).unwrap());
        let err = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &provider,
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PortoptError::MissingData { asset, .. } if asset == "QQQ"));
    }

    #[test]
    fn schedule_date_outside_calendar_is_missing_data() {
        let matrix = single_asset();
        let schedule = RebalanceSchedule::from_dates(vec![d(2024, 1, 2), d(2024, 1, 6)]);
        let err = run_backtest(
            &matrix,
            &schedule,
            &WeightProvider::History(WeightHistory::default()),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PortoptError::MissingData { .. }));
    }

    #[test]
    fn overflow_is_reported() {
        let dates = vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)];
        let matrix = ReturnMatrix::from_columns(
            dates,
            vec![("X".into(), vec![0.0, f64::MAX, f64::MAX])],
        )
        .unwrap();
        let err = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &WeightProvider::History(WeightHistory::default()),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PortoptError::NumericalOverflow { .. }));
    }

    #[test]
    fn optimized_provider_waits_for_min_history() {
        let matrix = two_assets();
        let schedule = build_schedule(
            matrix.dates(),
            RebalanceFrequency::None,
            ScheduleAnchor::FirstTradingDate,
        )
        .unwrap();
        let provider = WeightProvider::Optimized {
            model: OptimizationModel::MinimumVariance,
            constraints: Constraints::default(),
            lookback: None,
            min_history: 60,
        };
        let result =
            run_backtest(&matrix, &schedule, &provider, &BacktestConfig::default()).unwrap();
        assert!(result.rebalances.iter().all(|r| r.fallback));
    }

    #[test]
    fn optimizer_error_aborts_run() {
        let matrix = single_asset();
        let provider = WeightProvider::Optimized {
            model: OptimizationModel::EqualWeight,
            constraints: Constraints::default(),
            lookback: None,
            min_history: 2,
        };
        let schedule = RebalanceSchedule::from_dates(vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 5)]);
        let err = run_backtest(&matrix, &schedule, &provider, &BacktestConfig::default())
            .unwrap_err();
        assert!(matches!(err, PortoptError::OptimizationInput { .. }));
    }

    #[test]
    fn duplicate_history_dates_rejected() {
        let w = WeightVector::new(vec!["A".into()], vec![1.0]).unwrap();
        let err = WeightHistory::new(vec![(d(2024, 1, 2), w.clone()), (d(2024, 1, 2), w)]);
        assert!(err.is_err());
    }

    #[test]
    fn benchmark_path_is_equal_weight() {
        let matrix = two_assets();
        let path = benchmark_path(&matrix, &BacktestConfig::default()).unwrap();
        assert_eq!(path.len(), matrix.date_count());
        assert_relative_eq!(path.values()[1], 1.005, epsilon = 1e-12);
    }

    #[test]
    fn path_helpers() {
        let matrix = single_asset();
        let provider =
            WeightProvider::Fixed(WeightVector::new(vec!["SPY".into()], vec![1.0]).unwrap());
        let path = run_backtest(
            &matrix,
            &none_schedule(&matrix),
            &provider,
            &BacktestConfig::default(),
        )
        .unwrap()
        .path;
        assert_eq!(path.value_at(d(2024, 1, 3)), Some(path.values()[1]));
        assert_eq!(path.value_at(d(2024, 2, 1)), None);
        let returns = path.daily_returns();
        assert_relative_eq!(returns[1], -0.02, epsilon = 1e-12);
        assert_relative_eq!(path.final_value().unwrap(), 1.019494, epsilon = 1e-12);
    }
}
