//! Minority oversampling by neighbour interpolation
//!
//! Each synthetic row sits on the segment between a random minority sample
//! and one of its `k` nearest minority neighbours. Rows are appended until the
//! classes are equal; original rows are never touched.

use super::features::FeatureMatrix;
use crate::config::BalanceConfig;
use crate::error::{PipelineError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ClassBalancer {
    k_neighbors: usize,
    seed: u64,
}

impl ClassBalancer {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    pub fn from_config(config: &BalanceConfig) -> Self {
        Self::new(config.k_neighbors, config.seed)
    }

    /// Return the training set with synthetic minority rows appended
    pub fn resample(&self, x: &FeatureMatrix, y: &[u8]) -> Result<(FeatureMatrix, Vec<u8>)> {
        if x.rows() != y.len() {
            return Err(PipelineError::Data(format!(
                "feature rows ({}) and labels ({}) differ",
                x.rows(),
                y.len()
            )));
        }

        let positives = y.iter().filter(|&&v| v == 1).count();
        let negatives = y.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(PipelineError::Data(
                "training split holds a single class; nothing to balance".to_string(),
            ));
        }
        if positives == negatives {
            return Ok((x.clone(), y.to_vec()));
        }

        let (minority_label, deficit) = if positives < negatives {
            (1u8, negatives - positives)
        } else {
            (0u8, positives - negatives)
        };
        let minority: Vec<usize> = (0..y.len()).filter(|&i| y[i] == minority_label).collect();

        let required = self.k_neighbors + 1;
        if minority.len() < required {
            return Err(PipelineError::InsufficientMinority {
                required,
                actual: minority.len(),
            });
        }

        let neighbours = nearest_neighbours(x, &minority, self.k_neighbors);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut out_x = x.clone();
        let mut out_y = y.to_vec();
        let mut synthetic = vec![0.0; x.cols()];

        for _ in 0..deficit {
            let a = rng.random_range(0..minority.len());
            let b = neighbours[a][rng.random_range(0..self.k_neighbors)];
            let gap: f64 = rng.random();
            let base = x.row(minority[a]);
            let other = x.row(minority[b]);
            for (j, value) in synthetic.iter_mut().enumerate() {
                *value = base[j] + gap * (other[j] - base[j]);
            }
            out_x.push_row(&synthetic);
            out_y.push(minority_label);
        }

        info!(
            "Balanced training set: {} -> {} rows ({} synthetic class-{} rows)",
            y.len(),
            out_y.len(),
            deficit,
            minority_label
        );
        Ok((out_x, out_y))
    }
}

/// For each minority row, positions (into `minority`) of its k nearest
/// minority neighbours, excluding itself. Ties break on position.
fn nearest_neighbours(x: &FeatureMatrix, minority: &[usize], k: usize) -> Vec<Vec<usize>> {
    minority
        .iter()
        .enumerate()
        .map(|(a, &row_a)| {
            let mut distances: Vec<(f64, usize)> = minority
                .iter()
                .enumerate()
                .filter(|(b, _)| *b != a)
                .map(|(b, &row_b)| {
                    let d = x
                        .row(row_a)
                        .iter()
                        .zip(x.row(row_b))
                        .map(|(p, q)| (p - q) * (p - q))
                        .sum::<f64>();
                    (d, b)
                })
                .collect();
            distances.sort_by(|l, r| l.0.total_cmp(&r.0).then(l.1.cmp(&r.1)));
            distances.iter().take(k).map(|&(_, b)| b).collect()
        })
        .collect()
}
