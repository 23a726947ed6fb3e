//! Minimum-variance and tangency (maximum Sharpe) portfolios.
//!
//! Unbounded problems use the closed forms
//! `S⁻¹·1 / 1ᵀS⁻¹·1` and `S⁻¹(μ − rf) / 1ᵀS⁻¹(μ − rf)`. When the closed form
//! violates the bounds, the bounded problem is solved with [`solve_qp`]; the
//! tangency point is found by tracing the frontier
//! `min ½wᵀSw − t·(μ − rf)ᵀw` over `t` and keeping the best Sharpe ratio.

use crate::domain::error::PortoptError;
use crate::domain::linalg::{cholesky, dot, quad_form, solve_spd, Matrix};
use crate::domain::qp::{solve_qp, Bounds};

const FRONTIER_POINTS: usize = 49;
const GOLDEN_STEPS: usize = 60;
const FEASIBILITY_TOLERANCE: f64 = 1e-12;

/// Minimum-variance weights for a covariance matrix.
pub fn min_variance_weights(cov: &Matrix, bounds: &Bounds) -> Result<Vec<f64>, PortoptError> {
    let n = cov.len();
    if n == 0 || bounds.len() != n {
        return Err(PortoptError::input("covariance and bounds do not agree"));
    }
    cholesky(cov)?;

    let inv_ones = solve_spd(cov, &vec![1.0; n])?;
    let denom: f64 = inv_ones.iter().sum();
    if denom > 0.0 {
        let closed: Vec<f64> = inv_ones.iter().map(|v| v / denom).collect();
        if bounds.contains(&closed, FEASIBILITY_TOLERANCE) {
            return Ok(closed);
        }
    } else if bounds.is_unbounded() {
        return Err(PortoptError::failure("1ᵀS⁻¹1 is not positive"));
    }

    solve_qp(cov, &vec![0.0; n], bounds, None)
}

/// Tangency portfolio weights for annualized `mu`, `cov` and risk-free rate.
pub fn max_sharpe_weights(
    mu: &[f64],
    cov: &Matrix,
    risk_free_rate: f64,
    bounds: &Bounds,
) -> Result<Vec<f64>, PortoptError> {
    let n = mu.len();
    if cov.len() != n || bounds.len() != n {
        return Err(PortoptError::input("mean vector and covariance do not agree"));
    }
    let excess: Vec<f64> = mu.iter().map(|m| m - risk_free_rate).collect();
    let long_only = bounds.lower.iter().all(|l| *l >= 0.0);
    if long_only && excess.iter().all(|e| *e <= 0.0) {
        return Err(PortoptError::failure(format!(
            "no asset has an expected return above the risk-free rate {risk_free_rate}"
        )));
    }
    cholesky(cov)?;

    let z = solve_spd(cov, &excess)?;
    let denom: f64 = z.iter().sum();
    if denom > FEASIBILITY_TOLERANCE {
        let closed: Vec<f64> = z.iter().map(|v| v / denom).collect();
        if bounds.contains(&closed, FEASIBILITY_TOLERANCE) {
            return Ok(closed);
        }
    }
    if bounds.is_unbounded() {
        return Err(PortoptError::failure(
            "tangency portfolio is undefined: 1ᵀS⁻¹(μ − rf) is not positive",
        ));
    }

    frontier_search(cov, &excess, bounds)
}

fn sharpe(excess: &[f64], cov: &Matrix, w: &[f64]) -> f64 {
    let vol = quad_form(cov, w).max(0.0).sqrt();
    if vol > 0.0 {
        dot(excess, w) / vol
    } else {
        f64::NEG_INFINITY
    }
}

struct Candidate {
    weights: Vec<f64>,
    sharpe: f64,
}

fn frontier_search(
    cov: &Matrix,
    excess: &[f64],
    bounds: &Bounds,
) -> Result<Vec<f64>, PortoptError> {
    let n = excess.len();
    let mean_variance = (0..n).map(|i| cov[i][i]).sum::<f64>() / n as f64;
    let max_excess = excess.iter().fold(0.0_f64, |acc, e| acc.max(e.abs()));
    if max_excess == 0.0 {
        return min_variance_weights(cov, bounds);
    }
    let base = (mean_variance / max_excess).ln();

    let solve_at = |log_t: f64, warm: Option<&[f64]>| -> Result<Candidate, PortoptError> {
        let t = log_t.exp();
        let c: Vec<f64> = excess.iter().map(|e| t * e).collect();
        let weights = solve_qp(cov, &c, bounds, warm)?;
        let sharpe = sharpe(excess, cov, &weights);
        Ok(Candidate {
            weights,
            sharpe,
        })
    };

    // t = 0 end of the frontier.
    let min_var = min_variance_weights(cov, bounds)?;
    let mut best = Candidate {
        sharpe: sharpe(excess, cov, &min_var),
        weights: min_var,
    };

    let span = 4.0 * std::f64::consts::LN_10;
    let grid: Vec<f64> = (0..FRONTIER_POINTS)
        .map(|k| base - span + 2.0 * span * k as f64 / (FRONTIER_POINTS - 1) as f64)
        .collect();

    let mut best_idx = None;
    let mut warm: Option<Vec<f64>> = None;
    for (k, log_t) in grid.iter().enumerate() {
        let candidate = solve_at(*log_t, warm.as_deref())?;
        warm = Some(candidate.weights.clone());
        if candidate.sharpe > best.sharpe {
            best = candidate;
            best_idx = Some(k);
        }
    }

    if let Some(k) = best_idx {
        let mut lo = grid[k.saturating_sub(1)];
        let mut hi = grid[(k + 1).min(FRONTIER_POINTS - 1)];
        let ratio = 0.5 * (5.0_f64.sqrt() - 1.0);
        let mut x1 = hi - ratio * (hi - lo);
        let mut x2 = lo + ratio * (hi - lo);
        let mut c1 = solve_at(x1, Some(&best.weights))?;
        let mut c2 = solve_at(x2, Some(&best.weights))?;
        for _ in 0..GOLDEN_STEPS {
            if c1.sharpe >= c2.sharpe {
                hi = x2;
                x2 = x1;
                c2 = c1;
                x1 = hi - ratio * (hi - lo);
                c1 = solve_at(x1, Some(&c2.weights))?;
            } else {
                lo = x1;
                x1 = x2;
                c1 = c2;
                x2 = lo + ratio * (hi - lo);
                c2 = solve_at(x2, Some(&c1.weights))?;
            }
        }
        for candidate in [c1, c2] {
            if candidate.sharpe > best.sharpe {
                best = candidate;
            }
        }
    }

    if !best.sharpe.is_finite() {
        return Err(PortoptError::failure("no frontier portfolio has finite Sharpe ratio"));
    }
    Ok(best.weights)
}
