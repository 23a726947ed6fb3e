//! Performance metrics over a portfolio value path.

use super::backtest::{PathPoint, PortfolioPath};
use super::optimizer::TRADING_DAYS_PER_YEAR;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest stretch below a prior peak, in trading days.
    pub max_drawdown_duration: i64,
}

impl Metrics {
    pub fn compute(path: &PortfolioPath, risk_free_rate: f64) -> Self {
        let points = path.points();
        let initial = points.first().map_or(1.0, |p| p.value);
        let final_value = points.last().map_or(initial, |p| p.value);

        let total_return = if initial > 0.0 {
            (final_value - initial) / initial
        } else {
            0.0
        };

        let periods = points.len().saturating_sub(1) as f64;
        let years = periods / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(points);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let risk = compute_risk_adjusted(&path.daily_returns(), daily_rf);

        Metrics {
            total_return,
            annualized_return,
            annualized_volatility: risk.volatility,
            sharpe_ratio: risk.sharpe,
            sortino_ratio: risk.sortino,
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

fn compute_drawdown(points: &[PathPoint]) -> (f64, i64) {
    let Some(first) = points.first() else {
        return (0.0, 0);
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in points {
        if point.value >= peak {
            peak = point.value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

struct RiskAdjusted {
    volatility: f64,
    sharpe: f64,
    sortino: f64,
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> RiskAdjusted {
    if returns.is_empty() {
        return RiskAdjusted {
            volatility: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
        };
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;
    let annualizer = TRADING_DAYS_PER_YEAR.sqrt();

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * annualizer
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * annualizer
    } else {
        0.0
    };

    RiskAdjusted {
        volatility: stddev * annualizer,
        sharpe,
        sortino,
    }
}
