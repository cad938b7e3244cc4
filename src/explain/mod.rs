//! Explainability engine
//!
//! Produces the content of `explanations.json`:
//! - Global importance: mean absolute attribution over a seeded patient sample
//! - Per-patient additive attributions (top features plus the baseline)
//! - An optional local surrogate cross-check for one sampled patient
//!
//! Best-effort by contract: a missing backend or a failing computation empties
//! the affected section and logs a warning, it never fails the run.

pub mod shap;
pub mod surrogate;

#[cfg(test)]
mod tests;

use crate::config::{DataConfig, ExplainConfig};
use crate::data::PatientTable;
use crate::error::{PipelineError, Result};
use crate::ml::{ExplanationStrategy, FeatureMatrix, FeatureTransformer, ModelEnsemble};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub use shap::{Explainer, LinearExplainer, TreeExplainer};
pub use surrogate::{LocalSurrogate, SurrogateWeight};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    /// Transformed feature value
    pub value: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientExplanation {
    pub base_value: f64,
    pub contributions: Vec<Contribution>,
}

/// Content of `explanations.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanations {
    pub global_importance: Vec<FeatureImportance>,
    pub patients: BTreeMap<String, PatientExplanation>,
    /// Absent means not computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lime: Option<BTreeMap<String, Vec<SurrogateWeight>>>,
}

impl Explanations {
    pub fn is_empty(&self) -> bool {
        self.global_importance.is_empty() && self.patients.is_empty() && self.lime.is_none()
    }
}

/// Attribution backends available to this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backends {
    /// Tree-path and linear additive attribution
    pub attribution: bool,
    pub surrogate: bool,
}

impl Backends {
    pub fn detect(config: &ExplainConfig) -> Self {
        Self {
            attribution: cfg!(feature = "additive-attribution"),
            surrogate: cfg!(feature = "local-surrogate") && config.surrogate.enabled,
        }
    }

    pub fn none() -> Self {
        Self {
            attribution: false,
            surrogate: false,
        }
    }
}

pub struct ExplainabilityEngine {
    config: ExplainConfig,
    backends: Backends,
}

impl ExplainabilityEngine {
    pub fn new(config: ExplainConfig) -> Self {
        let backends = Backends::detect(&config);
        Self { config, backends }
    }

    pub fn with_backends(config: ExplainConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    pub fn backends(&self) -> Backends {
        self.backends
    }

    /// Seeded sample of row indices, in ascending order
    pub fn sample_rows(&self, n_rows: usize) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut rows: Vec<usize> = (0..n_rows).collect();
        rows.shuffle(&mut rng);
        rows.truncate(self.config.sample_size.min(n_rows));
        rows.sort_unstable();
        rows
    }

    /// Explain the ensemble over a sample of `table`. `features` is the
    /// transformed full table and doubles as the attribution background.
    pub fn explain(
        &self,
        ensemble: &ModelEnsemble,
        transformer: &FeatureTransformer,
        table: &PatientTable,
        features: &FeatureMatrix,
        data_config: &DataConfig,
    ) -> Explanations {
        if !self.config.enabled {
            info!("Explainability disabled; writing empty explanations");
            return Explanations::default();
        }

        let rows = self.sample_rows(table.len());
        let ids: Vec<String> = rows
            .iter()
            .map(|&i| table.patient_id(i, data_config))
            .collect();
        let names = transformer.feature_names();
        let mut out = Explanations::default();

        match self.attribution_sections(ensemble, names, features, &rows, &ids) {
            Ok((global, patients)) => {
                info!(
                    "Attributed {} patients, {} ranked features",
                    patients.len(),
                    global.len()
                );
                out.global_importance = global;
                out.patients = patients;
            }
            Err(e) => degrade("patients", &e),
        }

        if self.backends.surrogate {
            match self.surrogate_section(ensemble, names, features, &rows, &ids) {
                Ok(lime) => out.lime = Some(lime),
                Err(e) => degrade("lime", &e),
            }
        } else {
            debug!("Local surrogate backend unavailable; 'lime' omitted");
        }

        out
    }

    fn attribution_sections(
        &self,
        ensemble: &ModelEnsemble,
        names: &[String],
        features: &FeatureMatrix,
        rows: &[usize],
        ids: &[String],
    ) -> Result<(Vec<FeatureImportance>, BTreeMap<String, PatientExplanation>)> {
        if !self.backends.attribution {
            return Err(PipelineError::Explainability(
                "additive attribution backend not available".to_string(),
            ));
        }
        let member = ensemble.representative().ok_or_else(|| {
            PipelineError::Explainability("ensemble has no representative model".to_string())
        })?;
        debug!("Explaining with representative model {}", member.kind());

        let explainer: Box<dyn Explainer + '_> = match member.kind().explanation() {
            ExplanationStrategy::TreePath => {
                let trees = member.as_trees().ok_or_else(|| {
                    PipelineError::Explainability(format!("{} carries no trees", member.kind()))
                })?;
                Box::new(TreeExplainer::new(trees, features.cols())?)
            }
            ExplanationStrategy::Linear => {
                let linear = member.as_linear().ok_or_else(|| {
                    PipelineError::Explainability(format!(
                        "{} carries no coefficients",
                        member.kind()
                    ))
                })?;
                Box::new(LinearExplainer::new(linear, features)?)
            }
        };
        if names.len() != features.cols() {
            return Err(PipelineError::Explainability(format!(
                "{} feature names for {} columns",
                names.len(),
                features.cols()
            )));
        }

        let base_value = explainer.expected_value();
        let mut totals = vec![0.0; features.cols()];
        let mut patients = BTreeMap::new();

        for (&row, id) in rows.iter().zip(ids) {
            let values = features.row(row);
            let phi = explainer.attributions(values)?;
            for (total, v) in totals.iter_mut().zip(&phi) {
                *total += v.abs();
            }

            let mut order: Vec<usize> = (0..phi.len()).collect();
            order.sort_by(|&a, &b| phi[b].abs().total_cmp(&phi[a].abs()).then(a.cmp(&b)));
            let contributions = order
                .into_iter()
                .take(self.config.local_top_k)
                .map(|j| Contribution {
                    feature: names[j].clone(),
                    value: values[j],
                    contribution: phi[j],
                })
                .collect();
            patients.insert(
                id.clone(),
                PatientExplanation {
                    base_value,
                    contributions,
                },
            );
        }

        let n = rows.len().max(1) as f64;
        let mut global: Vec<FeatureImportance> = names
            .iter()
            .zip(totals)
            .map(|(name, total)| FeatureImportance {
                feature: name.clone(),
                importance: total / n,
            })
            .collect();
        // Stable sort keeps feature order among ties
        global.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        global.truncate(self.config.global_top_k);

        Ok((global, patients))
    }

    fn surrogate_section(
        &self,
        ensemble: &ModelEnsemble,
        names: &[String],
        features: &FeatureMatrix,
        rows: &[usize],
        ids: &[String],
    ) -> Result<BTreeMap<String, Vec<SurrogateWeight>>> {
        let (&row, id) = rows.first().zip(ids.first()).ok_or_else(|| {
            PipelineError::Explainability("no sampled patient to explain".to_string())
        })?;
        let surrogate = LocalSurrogate::new(self.config.surrogate.clone());
        let weights = surrogate.explain(features.row(row), features, names, |m| {
            ensemble.predict_proba(m)
        })?;
        debug!("Surrogate for {} kept {} features", id, weights.len());

        let mut section = BTreeMap::new();
        section.insert(id.clone(), weights);
        Ok(section)
    }
}

/// Log a section that is left empty. Errors outside the explainability
/// bucket are unexpected here and logged as errors.
fn degrade(section: &str, e: &PipelineError) {
    if e.is_fatal() {
        error!("Explainability section '{}' dropped after {} error: {}", section, e.stage(), e);
    } else {
        warn!("Explainability section '{}' left empty: {}", section, e);
    }
}
