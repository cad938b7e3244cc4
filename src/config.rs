//! Pipeline configuration
//!
//! Loaded from an optional TOML file with `PATIENT_RISK__` environment
//! overrides (e.g. `PATIENT_RISK__SPLIT__SEED=7`).

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub split: SplitConfig,
    pub balance: BalanceConfig,
    pub ensemble: EnsembleConfig,
    pub metrics: MetricsConfig,
    pub explain: ExplainConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration, layering environment overrides over the file.
    /// A missing file is not an error; every section has defaults.
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let expanded = shellexpand::tilde(path).into_owned();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&expanded).required(false))
            .add_source(
                config::Environment::with_prefix("PATIENT_RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no stage can run with
    pub fn validate(&self) -> Result<()> {
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "split.test_fraction must be in (0, 1), got {}",
                self.split.test_fraction
            )));
        }
        if self.balance.enabled && self.balance.k_neighbors == 0 {
            return Err(PipelineError::Configuration(
                "balance.k_neighbors must be at least 1".to_string(),
            ));
        }
        for (name, trees) in [
            ("boosted_trees", &self.ensemble.boosted_trees),
            ("regularized_trees", &self.ensemble.regularized_trees),
        ] {
            if trees.enabled && (trees.n_trees == 0 || trees.max_depth == 0) {
                return Err(PipelineError::Configuration(format!(
                    "ensemble.{}: n_trees and max_depth must be positive",
                    name
                )));
            }
            if !(trees.subsample > 0.0 && trees.subsample <= 1.0)
                || !(trees.colsample > 0.0 && trees.colsample <= 1.0)
            {
                return Err(PipelineError::Configuration(format!(
                    "ensemble.{}: subsample and colsample must be in (0, 1]",
                    name
                )));
            }
        }
        if self.ensemble.linear.c <= 0.0 {
            return Err(PipelineError::Configuration(
                "ensemble.linear.c must be positive".to_string(),
            ));
        }
        if self.metrics.threshold_points < 2 || self.metrics.calibration_bins == 0 {
            return Err(PipelineError::Configuration(
                "metrics.threshold_points must be >= 2 and calibration_bins >= 1".to_string(),
            ));
        }
        if self.explain.enabled && self.explain.sample_size == 0 {
            return Err(PipelineError::Configuration(
                "explain.sample_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Processed patient table
    pub input: String,
    pub id_column: String,
    /// Risk category column; derived from `score_column` when absent
    pub target_column: String,
    pub score_column: String,
    /// Columns never used as model features
    pub exclude_columns: Vec<String>,
    /// Raw covariates copied into predictions.json
    pub output_covariates: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input: "public/processed_medical_dataset.csv".to_string(),
            id_column: "patient_id".to_string(),
            target_column: "risk_level".to_string(),
            score_column: "risk_score".to_string(),
            exclude_columns: Vec::new(),
            output_covariates: ["age", "systolic_bp", "hba1c", "egfr", "bmi", "diabetes_type"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub enabled: bool,
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub linear: LinearConfig,
    pub boosted_trees: TreeConfig,
    pub regularized_trees: TreeConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            linear: LinearConfig::default(),
            boosted_trees: TreeConfig::default(),
            regularized_trees: TreeConfig::regularized(),
        }
    }
}

/// L2-penalised logistic regression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// Inverse regularisation strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-6,
        }
    }
}

/// Gradient-boosted tree settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub enabled: bool,
    pub n_trees: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample: f64,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: 300,
            learning_rate: 0.05,
            max_depth: 3,
            subsample: 0.9,
            colsample: 0.8,
            lambda: 0.0,
            min_child_weight: 1e-3,
            max_bins: 32,
            seed: 42,
        }
    }
}

impl TreeConfig {
    pub fn regularized() -> Self {
        Self {
            n_trees: 400,
            max_depth: 4,
            lambda: 1.0,
            min_child_weight: 1.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Evenly spaced thresholds in [0, 1]
    pub threshold_points: usize,
    /// Sweep the distinct observed scores instead
    pub exact: bool,
    pub calibration_bins: usize,
    pub decision_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            threshold_points: 61,
            exact: false,
            calibration_bins: 10,
            decision_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub enabled: bool,
    pub sample_size: usize,
    pub seed: u64,
    pub global_top_k: usize,
    pub local_top_k: usize,
    pub surrogate: SurrogateConfig,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: 200,
            seed: 42,
            global_top_k: 30,
            local_top_k: 10,
            surrogate: SurrogateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurrogateConfig {
    pub enabled: bool,
    pub num_samples: usize,
    pub num_features: usize,
    /// Defaults to 0.75 * sqrt(n_features)
    pub kernel_width: Option<f64>,
    pub seed: u64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_samples: 500,
            num_features: 10,
            kernel_width: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub bundle_file: String,
    pub predictions_file: String,
    pub evaluation_file: String,
    pub explanations_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "public/data".to_string(),
            bundle_file: "ensemble.bundle.json".to_string(),
            predictions_file: "predictions.json".to_string(),
            evaluation_file: "evaluation_trained.json".to_string(),
            explanations_file: "explanations.json".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).into_owned())
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir_path().join(Path::new(file))
    }
}
