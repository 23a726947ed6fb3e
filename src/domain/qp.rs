//! Box-constrained quadratic programs over the unit simplex.
//!
//! Solves `min ½·wᵀQw − cᵀw` subject to `Σw = 1` and `l ≤ w ≤ u` with an
//! accelerated projected gradient method. The projection onto the bounded
//! simplex is exact (bisection on the shift τ in `wᵢ = clamp(vᵢ − τ, lᵢ, uᵢ)`).

use crate::domain::error::PortoptError;
use crate::domain::linalg::{dot, mat_vec, Matrix};

pub const MAX_ITERATIONS: usize = 200_000;
pub const CONVERGENCE_TOLERANCE: f64 = 1e-12;
const BISECTION_STEPS: usize = 200;

/// Per-asset weight bounds. Infinite entries mean "unbounded".
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn new(n: usize, no_short_selling: bool, max_weight: Option<f64>) -> Self {
        let lower = if no_short_selling { 0.0 } else { f64::NEG_INFINITY };
        let upper = max_weight.unwrap_or(f64::INFINITY);
        Self {
            lower: vec![lower; n],
            upper: vec![upper; n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.iter().all(|l| l.is_infinite()) && self.upper.iter().all(|u| u.is_infinite())
    }

    /// Whether some w with Σw = 1 satisfies the bounds.
    pub fn is_feasible(&self) -> bool {
        let lo: f64 = self.lower.iter().sum();
        let hi: f64 = self.upper.iter().sum();
        lo <= 1.0 + 1e-12 && hi >= 1.0 - 1e-12
    }

    pub fn contains(&self, w: &[f64], tol: f64) -> bool {
        w.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(x, (l, u))| *x >= l - tol && *x <= u + tol)
    }
}

fn shifted_sum(v: &[f64], bounds: &Bounds, tau: f64) -> f64 {
    v.iter()
        .zip(bounds.lower.iter().zip(&bounds.upper))
        .map(|(x, (l, u))| (x - tau).clamp(*l, *u))
        .sum()
}

/// Euclidean projection of `v` onto `{w : Σw = 1, l ≤ w ≤ u}`.
pub fn project_capped_simplex(v: &[f64], bounds: &Bounds) -> Result<Vec<f64>, PortoptError> {
    if v.len() != bounds.len() {
        return Err(PortoptError::input("bounds do not match the number of assets"));
    }
    if !bounds.is_feasible() {
        return Err(PortoptError::failure(
            "constraint set is infeasible: bounds cannot sum to one",
        ));
    }
    if bounds.is_unbounded() {
        let shift = (v.iter().sum::<f64>() - 1.0) / v.len() as f64;
        return Ok(v.iter().map(|x| x - shift).collect());
    }

    // shifted_sum is non-increasing in tau; widen the bracket until it straddles 1.
    let spread = v.iter().fold(1.0_f64, |acc, x| acc.max(x.abs()));
    let mut lo = -2.0 * spread;
    let mut hi = 2.0 * spread;
    let mut widen = 0;
    while shifted_sum(v, bounds, lo) < 1.0 || shifted_sum(v, bounds, hi) > 1.0 {
        lo *= 2.0;
        hi *= 2.0;
        widen += 1;
        if widen > 64 {
            return Err(PortoptError::failure("projection bracket did not converge"));
        }
    }

    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if shifted_sum(v, bounds, mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * spread {
            break;
        }
    }
    let tau = 0.5 * (lo + hi);
    Ok(v.iter()
        .zip(bounds.lower.iter().zip(&bounds.upper))
        .map(|(x, (l, u))| (x - tau).clamp(*l, *u))
        .collect())
}

/// Gershgorin upper bound on the largest eigenvalue.
fn lipschitz_bound(q: &Matrix) -> f64 {
    q.iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Minimize `½·wᵀQw − cᵀw` over the bounded simplex.
pub fn solve_qp(
    q: &Matrix,
    c: &[f64],
    bounds: &Bounds,
    warm_start: Option<&[f64]>,
) -> Result<Vec<f64>, PortoptError> {
    let n = c.len();
    if q.len() != n || bounds.len() != n {
        return Err(PortoptError::input("QP dimensions do not agree"));
    }
    let lipschitz = lipschitz_bound(q);
    if !lipschitz.is_finite() || lipschitz <= 0.0 {
        return Err(PortoptError::failure("objective has no curvature"));
    }
    let step = 1.0 / lipschitz;

    let start = match warm_start {
        Some(w) => w.to_vec(),
        None => vec![1.0 / n as f64; n],
    };
    let mut w = project_capped_simplex(&start, bounds)?;
    let mut y = w.clone();
    let mut momentum = 1.0_f64;

    for _ in 0..MAX_ITERATIONS {
        let grad: Vec<f64> = mat_vec(q, &y)
            .iter()
            .zip(c)
            .map(|(qy, ci)| qy - ci)
            .collect();
        let target: Vec<f64> = y.iter().zip(&grad).map(|(yi, gi)| yi - step * gi).collect();
        let next = project_capped_simplex(&target, bounds)?;

        let delta: Vec<f64> = next.iter().zip(&w).map(|(a, b)| a - b).collect();
        let change = delta.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        if !change.is_finite() {
            return Err(PortoptError::failure("solver diverged"));
        }
        if change < CONVERGENCE_TOLERANCE {
            return Ok(next);
        }

        // Restart momentum when it points against the last step.
        let restart_probe: Vec<f64> = y.iter().zip(&next).map(|(a, b)| a - b).collect();
        if dot(&restart_probe, &delta) > 0.0 {
            momentum = 1.0;
            y = next.clone();
        } else {
            let next_momentum = 0.5 * (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt());
            let beta = (momentum - 1.0) / next_momentum;
            y = next
                .iter()
                .zip(&delta)
                .map(|(a, d)| a + beta * d)
                .collect();
            momentum = next_momentum;
        }
        w = next;
    }

    Err(PortoptError::failure(format!(
        "solver did not converge after {MAX_ITERATIONS} iterations"
    )))
}
