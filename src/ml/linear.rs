//! L2-regularised logistic regression
//!
//! Minimises `0.5 * |w|^2 + C * sum(logloss)` with an unpenalised intercept
//! using Newton steps with step halving. Deterministic for fixed inputs.

use super::features::FeatureMatrix;
use super::linalg::solve_spd;
use crate::config::LinearConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    config: LinearConfig,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LogisticModel {
    pub fn new(config: LinearConfig) -> Self {
        Self {
            config,
            intercept: 0.0,
            coefficients: Vec::new(),
        }
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()> {
        if x.rows() != y.len() {
            return Err(PipelineError::Data(format!(
                "feature rows ({}) and labels ({}) differ",
                x.rows(),
                y.len()
            )));
        }
        if x.rows() == 0 {
            return Err(PipelineError::Data("cannot fit on zero rows".to_string()));
        }

        let p = x.cols();
        let dim = p + 1;
        let penalty = 1.0 / self.config.c;
        // theta[0] is the intercept
        let mut theta = vec![0.0; dim];
        let mut loss = objective(x, y, &theta, penalty);

        for iter in 0..self.config.max_iter {
            let mut grad = vec![0.0; dim];
            let mut hess = vec![0.0; dim * dim];

            for i in 0..x.rows() {
                let row = x.row(i);
                let prob = sigmoid(margin(&theta, row));
                let residual = prob - f64::from(y[i]);
                let weight = (prob * (1.0 - prob)).max(1e-12);

                grad[0] += residual;
                for a in 0..p {
                    grad[a + 1] += residual * row[a];
                }
                hess[0] += weight;
                for a in 0..p {
                    let wa = weight * row[a];
                    hess[(a + 1) * dim] += wa;
                    for b in 0..=a {
                        hess[(a + 1) * dim + b + 1] += wa * row[b];
                    }
                }
            }

            for a in 0..dim {
                for b in 0..a {
                    hess[b * dim + a] = hess[a * dim + b];
                }
            }
            for a in 1..dim {
                grad[a] += penalty * theta[a];
                hess[a * dim + a] += penalty;
            }
            hess[0] += 1e-10;

            let step = solve_spd(&hess, &grad, dim)?;

            // Step halving keeps the objective non-increasing
            let mut scale = 1.0;
            let mut candidate = theta.clone();
            let mut candidate_loss = loss;
            for _ in 0..20 {
                for a in 0..dim {
                    candidate[a] = theta[a] - scale * step[a];
                }
                candidate_loss = objective(x, y, &candidate, penalty);
                if candidate_loss <= loss + 1e-12 {
                    break;
                }
                scale *= 0.5;
            }

            let max_change = step
                .iter()
                .map(|s| (s * scale).abs())
                .fold(0.0_f64, f64::max);
            theta = candidate;
            loss = candidate_loss;

            if max_change < self.config.tol {
                debug!("Logistic regression converged after {} iterations", iter + 1);
                break;
            }
            if iter + 1 == self.config.max_iter {
                warn!(
                    "Logistic regression hit max_iter={} (last change {:.2e})",
                    self.config.max_iter, max_change
                );
            }
        }

        self.intercept = theta[0];
        self.coefficients = theta[1..].to_vec();
        Ok(())
    }

    /// Log-odds for one transformed row
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    pub fn predict_proba(&self, x: &FeatureMatrix) -> Vec<f64> {
        (0..x.rows())
            .map(|i| sigmoid(self.decision_function(x.row(i))))
            .collect()
    }
}

fn margin(theta: &[f64], row: &[f64]) -> f64 {
    theta[0] + theta[1..].iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
}

fn objective(x: &FeatureMatrix, y: &[u8], theta: &[f64], penalty: f64) -> f64 {
    let mut loss = 0.0;
    for i in 0..x.rows() {
        let m = margin(theta, x.row(i));
        // log(1 + e^m) - y*m, computed stably
        let softplus = if m > 0.0 {
            m + (-m).exp().ln_1p()
        } else {
            m.exp().ln_1p()
        };
        loss += softplus - f64::from(y[i]) * m;
    }
    loss + 0.5 * penalty * theta[1..].iter().map(|w| w * w).sum::<f64>()
}

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
