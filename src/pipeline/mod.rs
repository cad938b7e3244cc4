//! Training pipeline
//!
//! Strictly sequential stages:
//!
//! ```text
//! split → fit/transform → balance → fit models → predict → metrics → explain → write
//! ```
//!
//! Any failure before the write stage aborts the run with nothing written.
//! Explainability degrades instead of failing, and each artifact is written
//! even when another one could not be.

use crate::artifacts::{prediction_rows, ArtifactWriter, ModelBundle};
use crate::config::{Config, DataConfig};
use crate::data::{stratified_split, PatientTable};
use crate::error::{PipelineError, Result};
use crate::explain::{ExplainabilityEngine, Explanations};
use crate::metrics::{EvaluationReport, MetricsEngine};
use crate::ml::{ClassBalancer, FeatureTransformer, ModelEnsemble, ModelKind};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};


/// What a completed training run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rows: usize,
    pub train_rows: usize,
    pub balanced_rows: usize,
    pub test_rows: usize,
    pub members: Vec<ModelKind>,
    pub evaluation: EvaluationReport,
    pub explained_patients: usize,
    pub written: Vec<PathBuf>,
}

pub struct Pipeline {
    config: Config,
    explain: bool,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let explain = config.explain.enabled;
        Self { config, explain }
    }

    /// Skip the explanation stage; an empty explanations file is still written
    pub fn without_explanations(mut self) -> Self {
        self.explain = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage over `table` and write artifacts through `writer`
    pub fn train(&self, table: &PatientTable, writer: &ArtifactWriter) -> Result<RunSummary> {
        self.run(table, writer).inspect_err(|e| {
            if e.is_fatal() {
                error!("Run aborted by {} error: {}", e.stage(), e);
            }
        })
    }

    fn run(&self, table: &PatientTable, writer: &ArtifactWriter) -> Result<RunSummary> {
        let started = Instant::now();
        let data = &self.config.data;

        // Configuration problems surface before any work is done
        let mut ensemble = ModelEnsemble::from_config(&self.config.ensemble)?;
        let labels = table.labels(data)?;
        let columns = table.feature_columns(data);
        if columns.is_empty() {
            return Err(PipelineError::Data(
                "no feature columns left after exclusions".to_string(),
            ));
        }

        let split = stratified_split(&labels, self.config.split.test_fraction, self.config.split.seed)?;
        let train_table = table.select(&split.train);
        let test_table = table.select(&split.test);
        let y_train: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();

        let transformer = FeatureTransformer::fit(&train_table, &columns)?;
        let x_train = transformer.transform_table(&train_table);
        let x_test = transformer.transform_table(&test_table);

        let (x_fit, y_fit) = if self.config.balance.enabled {
            ClassBalancer::from_config(&self.config.balance).resample(&x_train, &y_train)?
        } else {
            info!("Class balancing disabled");
            (x_train, y_train)
        };

        ensemble.fit(&x_fit, &y_fit)?;

        let test_scores = ensemble.predict_proba(&x_test);
        let evaluation = MetricsEngine::new(self.config.metrics.clone()).evaluate(&test_scores, &y_test)?;

        let full = transformer.transform_table(table);
        let probabilities = ensemble.predict_proba(&full);
        let predictions = prediction_rows(table, &probabilities, data);

        let explanations = if self.explain {
            ExplainabilityEngine::new(self.config.explain.clone())
                .explain(&ensemble, &transformer, table, &full, data)
        } else {
            info!("Explanation stage skipped");
            Explanations::default()
        };

        let members = ensemble.kinds();
        let bundle = ModelBundle::new(transformer, ensemble);
        let written = write_all(writer, &bundle, &predictions, &evaluation, &explanations)?;

        info!(
            "Pipeline finished in {:.1}s: {} predictions, AUC={:.3}",
            started.elapsed().as_secs_f64(),
            predictions.len(),
            evaluation.roc.auc
        );

        Ok(RunSummary {
            rows: table.len(),
            train_rows: split.train.len(),
            balanced_rows: y_fit.len(),
            test_rows: split.test.len(),
            members,
            evaluation,
            explained_patients: explanations.patients.len(),
            written,
        })
    }
}

/// Attempt every artifact. Explanations are best-effort; a failure on any
/// other artifact is reported after the remaining writes were tried.
fn write_all(
    writer: &ArtifactWriter,
    bundle: &ModelBundle,
    predictions: &[Value],
    evaluation: &EvaluationReport,
    explanations: &Explanations,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut first_error = None;

    for result in [
        writer.write_bundle(bundle),
        writer.write_predictions(predictions),
        writer.write_evaluation(evaluation),
    ] {
        match result {
            Ok(path) => written.push(path),
            Err(e) => {
                error!("Artifact write failed ({}): {}", e.stage(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    match writer.write_explanations(explanations) {
        Ok(path) => written.push(path),
        Err(e) => warn!("Explanations not written ({}): {}", e.stage(), e),
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

/// Score raw rows with a persisted bundle
pub fn predict(bundle: &ModelBundle, table: &PatientTable, data: &DataConfig) -> Vec<Value> {
    let probabilities = bundle.predict_proba(&table.records);
    prediction_rows(table, &probabilities, data)
}

/// Evaluation from a table that already carries a 0-100 risk score
pub fn evaluate_scores(table: &PatientTable, config: &Config) -> Result<EvaluationReport> {
    let data = &config.data;
    if !table.has_column(&data.score_column) {
        return Err(PipelineError::MissingColumn {
            column: data.score_column.clone(),
        });
    }

    let scores = table
        .records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            record
                .get(&data.score_column)
                .as_f64()
                .map(|s| (s / 100.0).clamp(0.0, 1.0))
                .ok_or_else(|| {
                    PipelineError::Data(format!(
                        "row {} has no numeric {}",
                        row, data.score_column
                    ))
                })
        })
        .collect::<Result<Vec<f64>>>()?;
    let labels = table.labels(data)?;

    MetricsEngine::new(config.metrics.clone()).evaluate(&scores, &labels)
}
