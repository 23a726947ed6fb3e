//! Closed-form allocations: equal weight and inverse volatility.
//!
//! "Risk parity" here is the naive inverse-volatility heuristic
//! `wᵢ ∝ 1/σᵢ`, not an equal-risk-contribution solve.

use crate::domain::error::PortoptError;
use crate::domain::linalg::Matrix;

pub fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

pub fn inverse_volatility_weights(cov: &Matrix) -> Result<Vec<f64>, PortoptError> {
    let inverse: Vec<f64> = (0..cov.len())
        .map(|i| {
            let sigma = cov[i][i].max(0.0).sqrt();
            if sigma > 0.0 {
                Ok(1.0 / sigma)
            } else {
                Err(PortoptError::input(format!(
                    "asset {i} has zero volatility"
                )))
            }
        })
        .collect::<Result<_, _>>()?;
    let total: f64 = inverse.iter().sum();
    if total <= 0.0 {
        return Err(PortoptError::input("no assets to weight"));
    }
    Ok(inverse.into_iter().map(|v| v / total).collect())
}

/// Cap every weight at `cap`, handing the excess to uncapped assets in
/// proportion to their current weight. Non-negative input only.
pub fn cap_weights(mut weights: Vec<f64>, cap: f64) -> Result<Vec<f64>, PortoptError> {
    let n = weights.len();
    if cap * (n as f64) < 1.0 - 1e-12 {
        return Err(PortoptError::failure(format!(
            "cap {cap} is infeasible for {n} assets"
        )));
    }
    let mut capped = vec![false; n];
    // each pass pins at least one more asset, so n passes suffice
    for _ in 0..n {
        let mut excess = 0.0;
        for (w, pinned) in weights.iter_mut().zip(capped.iter_mut()) {
            if !*pinned && *w > cap {
                excess += *w - cap;
                *w = cap;
                *pinned = true;
            }
        }
        if excess <= 0.0 {
            break;
        }
        let free: f64 = weights
            .iter()
            .zip(&capped)
            .filter(|(_, pinned)| !**pinned)
            .map(|(w, _)| *w)
            .sum();
        let free_count = capped.iter().filter(|p| !**p).count();
        for (w, pinned) in weights.iter_mut().zip(&capped) {
            if *pinned {
                continue;
            }
            *w += if free > 0.0 {
                excess * *w / free
            } else {
                excess / free_count as f64
            };
        }
    }
    Ok(weights)
}

pub fn apply_cap(weights: Vec<f64>, cap: Option<f64>) -> Result<Vec<f64>, PortoptError> {
    match cap {
        Some(c) => cap_weights(weights, c),
        None => Ok(weights),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equal_weights_exact() {
        assert!(equal_weights(0).is_empty());
        assert_eq!(equal_weights(4), vec![0.25; 4]);
        let w = equal_weights(3);
        assert!(w.iter().all(|x| *x == 1.0 / 3.0));
    }

    #[test]
    fn inverse_volatility_known_values() {
        // sigma = 0.1 and 0.2 -> 1/sigma = 10, 5
        let cov = vec![vec![0.01, 0.003], vec![0.003, 0.04]];
        let w = inverse_volatility_weights(&cov).unwrap();
        assert_relative_eq!(w[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(w[1], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_volatility_rejects_zero_variance() {
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.04]];
        assert!(matches!(
            inverse_volatility_weights(&cov),
            Err(PortoptError::OptimizationInput { .. })
        ));
    }

    #[test]
    fn cap_redistributes_proportionally() {
        let w = cap_weights(vec![0.7, 0.2, 0.1], 0.5).unwrap();
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(w[1], 0.2 + 0.2 * 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(w[2], 0.1 + 0.2 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cap_cascades() {
        let w = cap_weights(vec![0.6, 0.3, 0.05, 0.05], 0.3).unwrap();
        assert!(w.iter().all(|x| *x <= 0.3 + 1e-12));
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cap_infeasible() {
        assert!(cap_weights(vec![0.5, 0.5], 0.4).is_err());
    }

    #[test]
    fn cap_exactly_one_over_n_is_feasible() {
        let w = cap_weights(vec![0.4, 0.3, 0.2, 0.1], 0.25).unwrap();
        assert!(w.iter().all(|x| (*x - 0.25).abs() < 1e-12));
    }

    #[test]
    fn apply_cap_none_is_identity() {
        assert_eq!(apply_cap(vec![0.9, 0.1], None).unwrap(), vec![0.9, 0.1]);
    }
}
