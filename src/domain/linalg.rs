//! Dense statistics and linear algebra on `Vec<Vec<f64>>` matrices.

use crate::domain::error::PortoptError;

pub type Matrix = Vec<Vec<f64>>;

/// Relative pivot tolerance for the Cholesky factorization.
const PIVOT_TOLERANCE: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn column_means(columns: &[Vec<f64>]) -> Vec<f64> {
    columns.iter().map(|c| mean(c)).collect()
}

/// Sample covariance (n - 1 denominator) of equally long columns.
pub fn sample_covariance(columns: &[Vec<f64>]) -> Matrix {
    let k = columns.len();
    let n = columns.first().map_or(0, Vec::len);
    let means = column_means(columns);
    let mut cov = vec![vec![0.0; k]; k];
    if n < 2 {
        return cov;
    }
    let denom = (n - 1) as f64;
    for i in 0..k {
        for j in i..k {
            let s: f64 = columns[i]
                .iter()
                .zip(&columns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum();
            cov[i][j] = s / denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Correlation from covariance. Zero-variance assets are treated as
/// uncorrelated with everything else.
pub fn correlation_from_covariance(cov: &Matrix) -> Matrix {
    let k = cov.len();
    let sd: Vec<f64> = (0..k).map(|i| cov[i][i].max(0.0).sqrt()).collect();
    let mut corr = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in 0..k {
            corr[i][j] = if i == j {
                1.0
            } else if sd[i] > 0.0 && sd[j] > 0.0 {
                snap_unit(cov[i][j] / (sd[i] * sd[j]))
            } else {
                0.0
            };
        }
    }
    corr
}

/// Clamp to [-1, 1], rounding values within rounding noise of ±1 onto ±1.
fn snap_unit(rho: f64) -> f64 {
    const TOLERANCE: f64 = 8.0 * f64::EPSILON;
    if rho >= 1.0 - TOLERANCE {
        1.0
    } else if rho <= -1.0 + TOLERANCE {
        -1.0
    } else {
        rho
    }
}

pub fn scale(mat: &Matrix, factor: f64) -> Matrix {
    mat.iter()
        .map(|row| row.iter().map(|v| v * factor).collect())
        .collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn mat_vec(mat: &Matrix, v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| dot(row, v)).collect()
}

/// vᵀ·M·v
pub fn quad_form(mat: &Matrix, v: &[f64]) -> f64 {
    dot(v, &mat_vec(mat, v))
}

/// Sub-matrix over the given indices.
pub fn submatrix(mat: &Matrix, idx: &[usize]) -> Matrix {
    idx.iter()
        .map(|&i| idx.iter().map(|&j| mat[i][j]).collect())
        .collect()
}

/// Lower-triangular Cholesky factor. Fails when the matrix is not
/// numerically positive definite.
pub fn cholesky(mat: &Matrix) -> Result<Matrix, PortoptError> {
    let n = mat.len();
    let trace: f64 = (0..n).map(|i| mat[i][i].abs()).sum();
    let floor = PIVOT_TOLERANCE * trace.max(f64::MIN_POSITIVE);
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = mat[i][i] - s;
                if !(pivot > floor) {
                    return Err(PortoptError::failure(format!(
                        "covariance matrix is singular or ill-conditioned (pivot {pivot:e} at {i})"
                    )));
                }
                l[i][j] = pivot.sqrt();
            } else {
                l[i][j] = (mat[i][j] - s) / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Solve M·x = b for symmetric positive definite M.
pub fn solve_spd(mat: &Matrix, b: &[f64]) -> Result<Vec<f64>, PortoptError> {
    let l = cholesky(mat)?;
    let n = b.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let s: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (b[i] - s) / l[i][i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (y[i] - s) / l[i][i];
    }
    Ok(x)
}
