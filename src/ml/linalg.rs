//! Small dense solvers for the Newton and ridge steps

use crate::error::{PipelineError, Result};

/// Solve `A x = b` for symmetric positive-definite `A` (row-major, n x n)
/// via Cholesky factorisation.
pub fn solve_spd(a: &[f64], b: &[f64], n: usize) -> Result<Vec<f64>> {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(b.len(), n);

    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 1e-12 || !sum.is_finite() {
                    return Err(PipelineError::SingularMatrix);
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * n + k] * y[k];
        }
        y[i] = sum / l[i * n + i];
    }

    // Back substitution: L^T x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }

    Ok(x)
}

/// Weighted ridge regression with an unpenalised intercept.
/// Returns `(intercept, coefficients)`.
pub fn weighted_ridge(
    rows: &[Vec<f64>],
    targets: &[f64],
    weights: &[f64],
    alpha: f64,
) -> Result<(f64, Vec<f64>)> {
    let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
    let dim = n_features + 1;
    let mut gram = vec![0.0; dim * dim];
    let mut rhs = vec![0.0; dim];

    for ((row, &target), &w) in rows.iter().zip(targets).zip(weights) {
        // Augmented row [1, x...]
        for a in 0..dim {
            let xa = if a == 0 { 1.0 } else { row[a - 1] };
            rhs[a] += w * xa * target;
            for b in 0..=a {
                let xb = if b == 0 { 1.0 } else { row[b - 1] };
                gram[a * dim + b] += w * xa * xb;
            }
        }
    }
    for a in 0..dim {
        for b in 0..a {
            gram[b * dim + a] = gram[a * dim + b];
        }
    }
    for j in 1..dim {
        gram[j * dim + j] += alpha;
    }

    let solution = solve_spd(&gram, &rhs, dim)?;
    Ok((solution[0], solution[1..].to_vec()))
}
