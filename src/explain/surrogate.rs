//! Local linear surrogate
//!
//! Perturbs one instance with background-scaled Gaussian noise, weights each
//! perturbation by an exponential kernel on its scaled distance, and fits a
//! sparse weighted ridge model to the black-box probabilities.

use crate::config::SurrogateConfig;
use crate::error::{PipelineError, Result};
use crate::ml::linalg::weighted_ridge;
use crate::ml::FeatureMatrix;
use crate::utils::normal;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const RIDGE_ALPHA: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateWeight {
    pub feature: String,
    pub weight: f64,
}

pub struct LocalSurrogate {
    config: SurrogateConfig,
}

impl LocalSurrogate {
    pub fn new(config: SurrogateConfig) -> Self {
        Self { config }
    }

    pub fn kernel_width(&self, n_features: usize) -> f64 {
        self.config
            .kernel_width
            .unwrap_or_else(|| 0.75 * (n_features as f64).sqrt())
    }

    /// Fit the surrogate around `instance` and return the selected features'
    /// weights, strongest first.
    pub fn explain<F>(
        &self,
        instance: &[f64],
        background: &FeatureMatrix,
        feature_names: &[String],
        predict: F,
    ) -> Result<Vec<SurrogateWeight>>
    where
        F: Fn(&FeatureMatrix) -> Vec<f64>,
    {
        let n_features = instance.len();
        if n_features == 0 || feature_names.len() != n_features || background.cols() != n_features {
            return Err(PipelineError::Explainability(format!(
                "surrogate shape mismatch: instance {}, names {}, background {}",
                n_features,
                feature_names.len(),
                background.cols()
            )));
        }
        if self.config.num_samples < 2 {
            return Err(PipelineError::Explainability(
                "surrogate needs at least 2 samples".to_string(),
            ));
        }

        let means = background.column_means();
        let scales: Vec<f64> = background
            .column_stds()
            .into_iter()
            .map(|s| if s > 1e-12 { s } else { 1.0 })
            .collect();

        // First sample is the instance itself
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut samples = FeatureMatrix::zeros(0, n_features);
        samples.push_row(instance);
        let mut perturbed = vec![0.0; n_features];
        for _ in 1..self.config.num_samples {
            for (j, value) in perturbed.iter_mut().enumerate() {
                *value = instance[j] + normal(&mut rng) * scales[j];
            }
            samples.push_row(&perturbed);
        }

        let targets = predict(&samples);
        if targets.len() != samples.rows() || targets.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::Explainability(
                "black-box predictions unusable for surrogate".to_string(),
            ));
        }

        let width = self.kernel_width(n_features);
        let scaled: Vec<Vec<f64>> = (0..samples.rows())
            .map(|i| {
                samples
                    .row(i)
                    .iter()
                    .enumerate()
                    .map(|(j, v)| (v - means[j]) / scales[j])
                    .collect()
            })
            .collect();
        let weights: Vec<f64> = scaled
            .iter()
            .map(|row| {
                let distance_sq: f64 = row
                    .iter()
                    .zip(&scaled[0])
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (-distance_sq / (width * width)).exp().sqrt()
            })
            .collect();

        // Select on the full model, report the refit on the selection
        let (_, full) = weighted_ridge(&scaled, &targets, &weights, RIDGE_ALPHA)
            .map_err(|e| PipelineError::Explainability(format!("surrogate selection fit: {}", e)))?;
        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| full[b].abs().total_cmp(&full[a].abs()).then(a.cmp(&b)));
        order.truncate(self.config.num_features.clamp(1, n_features));

        let selected: Vec<Vec<f64>> = scaled
            .iter()
            .map(|row| order.iter().map(|&j| row[j]).collect())
            .collect();
        let (_, coefficients) = weighted_ridge(&selected, &targets, &weights, RIDGE_ALPHA)
            .map_err(|e| PipelineError::Explainability(format!("surrogate refit: {}", e)))?;

        let mut result: Vec<SurrogateWeight> = order
            .iter()
            .zip(coefficients)
            .map(|(&j, weight)| SurrogateWeight {
                feature: feature_names[j].clone(),
                weight,
            })
            .collect();
        result.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
        Ok(result)
    }
}
