//! Model ensemble
//!
//! A capability-detected set of binary classifiers combined by the mean of
//! their class-1 probabilities. The logistic model is always registered; each
//! tree backend joins only when compiled in and enabled.

use super::features::FeatureMatrix;
use super::linear::{sigmoid, LogisticModel};
use super::trees::BoostedTrees;
use crate::config::EnsembleConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Shared contract of every ensemble member
pub trait Classifier {
    fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()>;

    /// Raw log-odds for one transformed row
    fn decision_function(&self, row: &[f64]) -> f64;

    fn predict_proba(&self, x: &FeatureMatrix) -> Vec<f64> {
        (0..x.rows())
            .map(|i| sigmoid(self.decision_function(x.row(i))))
            .collect()
    }
}

impl Classifier for LogisticModel {
    fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()> {
        LogisticModel::fit(self, x, y)
    }

    fn decision_function(&self, row: &[f64]) -> f64 {
        LogisticModel::decision_function(self, row)
    }
}

impl Classifier for BoostedTrees {
    fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()> {
        BoostedTrees::fit(self, x, y)
    }

    fn decision_function(&self, row: &[f64]) -> f64 {
        BoostedTrees::decision_function(self, row)
    }
}

/// How a member's predictions are attributed to features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplanationStrategy {
    /// Coefficient-weighted deviation from the background mean
    Linear,
    /// Exact path-dependent attribution over the tree structure
    TreePath,
}

/// Registered model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Logistic,
    BoostedTrees,
    RegularizedTrees,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Logistic => "logistic",
            ModelKind::BoostedTrees => "boosted_trees",
            ModelKind::RegularizedTrees => "regularized_trees",
        }
    }

    pub fn explanation(&self) -> ExplanationStrategy {
        match self {
            ModelKind::Logistic => ExplanationStrategy::Linear,
            ModelKind::BoostedTrees | ModelKind::RegularizedTrees => ExplanationStrategy::TreePath,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.explanation() == ExplanationStrategy::TreePath
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which optional backends this build carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub boosted_trees: bool,
    pub regularized_trees: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            boosted_trees: cfg!(feature = "boosted-trees"),
            regularized_trees: cfg!(feature = "regularized-trees"),
        }
    }

    pub fn none() -> Self {
        Self {
            boosted_trees: false,
            regularized_trees: false,
        }
    }
}

/// One fitted (or fittable) ensemble member, tagged by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    Logistic(LogisticModel),
    BoostedTrees(BoostedTrees),
    RegularizedTrees(BoostedTrees),
}

impl Member {
    pub fn kind(&self) -> ModelKind {
        match self {
            Member::Logistic(_) => ModelKind::Logistic,
            Member::BoostedTrees(_) => ModelKind::BoostedTrees,
            Member::RegularizedTrees(_) => ModelKind::RegularizedTrees,
        }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        match self {
            Member::Logistic(m) => m,
            Member::BoostedTrees(m) | Member::RegularizedTrees(m) => m,
        }
    }

    fn classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Member::Logistic(m) => m,
            Member::BoostedTrees(m) | Member::RegularizedTrees(m) => m,
        }
    }

    pub fn as_linear(&self) -> Option<&LogisticModel> {
        match self {
            Member::Logistic(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_trees(&self) -> Option<&BoostedTrees> {
        match self {
            Member::BoostedTrees(m) | Member::RegularizedTrees(m) => Some(m),
            Member::Logistic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEnsemble {
    members: Vec<Member>,
}

impl ModelEnsemble {
    /// Ensemble over explicit members; empty is a configuration error
    pub fn new(members: Vec<Member>) -> Result<Self> {
        if members.is_empty() {
            return Err(PipelineError::Configuration(
                "no model backend registered".to_string(),
            ));
        }
        Ok(Self { members })
    }

    /// Register the mandatory linear model plus every available tree backend
    pub fn from_config(config: &EnsembleConfig) -> Result<Self> {
        Self::with_capabilities(config, Capabilities::detect())
    }

    pub fn with_capabilities(config: &EnsembleConfig, caps: Capabilities) -> Result<Self> {
        let mut members = vec![Member::Logistic(LogisticModel::new(config.linear.clone()))];

        match (caps.boosted_trees, config.boosted_trees.enabled) {
            (true, true) => members.push(Member::BoostedTrees(BoostedTrees::new(
                config.boosted_trees.clone(),
            ))),
            (false, true) => warn!("boosted_trees backend not compiled in; skipping"),
            _ => {}
        }
        match (caps.regularized_trees, config.regularized_trees.enabled) {
            (true, true) => members.push(Member::RegularizedTrees(BoostedTrees::new(
                config.regularized_trees.clone(),
            ))),
            (false, true) => warn!("regularized_trees backend not compiled in; skipping"),
            _ => {}
        }

        let ensemble = Self::new(members)?;
        info!(
            "Registered ensemble members: [{}]",
            ensemble
                .kinds()
                .iter()
                .map(ModelKind::name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(ensemble)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.members.iter().map(Member::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Train every member independently on the same data
    pub fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()> {
        for member in &mut self.members {
            let kind = member.kind();
            info!("Fitting {} on {} rows x {} features", kind, x.rows(), x.cols());
            member.classifier_mut().fit(x, y)?;
        }
        Ok(())
    }

    /// Arithmetic mean of member class-1 probabilities
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Vec<f64> {
        let mut sums = vec![0.0; x.rows()];
        for member in &self.members {
            for (s, p) in sums.iter_mut().zip(member.classifier().predict_proba(x)) {
                *s += p;
            }
        }
        let n = self.members.len().max(1) as f64;
        sums.into_iter().map(|s| (s / n).clamp(0.0, 1.0)).collect()
    }

    /// Member used for attribution: first tree model, else the linear one
    pub fn representative(&self) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.kind().is_tree())
            .or_else(|| self.members.iter().find(|m| m.kind() == ModelKind::Logistic))
    }
}
