//! Hierarchical Risk Parity.
//!
//! 1. distance d(i,j) = sqrt(0.5 * (1 - corr(i,j)))
//! 2. single-linkage tree, leaves read left to right (quasi-diagonal order)
//! 3. recursive bisection of that order, splitting capital by inverse
//!    cluster variance
//!
//! Assets are processed in identifier order, so the result does not depend
//! on the order in which the caller lists them.

use crate::domain::cluster::single_linkage;
use crate::domain::error::PortoptError;
use crate::domain::linalg::{correlation_from_covariance, quad_form, submatrix, Matrix};

pub fn hrp_weights(assets: &[String], cov: &Matrix) -> Result<Vec<f64>, PortoptError> {
    let n = assets.len();
    if cov.len() != n {
        return Err(PortoptError::input("assets and covariance do not agree"));
    }
    if n == 0 {
        return Err(PortoptError::input("no assets to weight"));
    }
    if let Some(i) = (0..n).find(|&i| !(cov[i][i] > 0.0)) {
        return Err(PortoptError::input(format!(
            "{} has zero variance",
            assets[i]
        )));
    }

    let mut canonical: Vec<usize> = (0..n).collect();
    canonical.sort_by(|&a, &b| assets[a].cmp(&assets[b]));
    let cov_c = submatrix(cov, &canonical);

    let distance = correlation_distance(&cov_c);
    let tree = single_linkage(&distance)
        .ok_or_else(|| PortoptError::input("no assets to cluster"))?;
    let order = tree.leaf_order();

    let weights_c = recursive_bisection(&cov_c, &order);

    let mut weights = vec![0.0; n];
    for (pos, &original) in canonical.iter().enumerate() {
        weights[original] = weights_c[pos];
    }
    Ok(weights)
}

pub fn correlation_distance(cov: &Matrix) -> Matrix {
    correlation_from_covariance(cov)
        .iter()
        .map(|row| {
            row.iter()
                .map(|rho| (0.5 * (1.0 - rho)).clamp(0.0, 1.0).sqrt())
                .collect()
        })
        .collect()
}

/// Variance of a cluster held with inverse-variance weights.
fn cluster_variance(cov: &Matrix, members: &[usize]) -> f64 {
    let sub = submatrix(cov, members);
    let inverse: Vec<f64> = (0..sub.len()).map(|i| 1.0 / sub[i][i]).collect();
    let total: f64 = inverse.iter().sum();
    let ivp: Vec<f64> = inverse.iter().map(|v| v / total).collect();
    quad_form(&sub, &ivp)
}

fn recursive_bisection(cov: &Matrix, order: &[usize]) -> Vec<f64> {
    let mut weights = vec![1.0; cov.len()];
    let mut pending: Vec<&[usize]> = vec![order];
    while let Some(cluster) = pending.pop() {
        if cluster.len() < 2 {
            continue;
        }
        let (left, right) = cluster.split_at(cluster.len() / 2);
        let left_var = cluster_variance(cov, left);
        let right_var = cluster_variance(cov, right);
        let alpha = 1.0 - left_var / (left_var + right_var);
        for &i in left {
            weights[i] *= alpha;
        }
        for &i in right {
            weights[i] *= 1.0 - alpha;
        }
        pending.push(right);
        pending.push(left);
    }
    weights
}
