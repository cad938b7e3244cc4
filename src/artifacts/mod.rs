//! Persisted artifacts
//!
//! The model bundle keeps the frozen transformer next to the fitted ensemble,
//! since scores cannot be reproduced from either alone. The three dashboard
//! JSON files are written independently of each other.

use crate::config::{DataConfig, OutputConfig};
use crate::data::PatientTable;
use crate::error::{PipelineError, Result};
use crate::explain::Explanations;
use crate::metrics::EvaluationReport;
use crate::ml::{FeatureTransformer, ModelEnsemble};
use crate::types::{risk_score, PatientRecord, RiskLevel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Transformer and ensemble persisted together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub transformer: FeatureTransformer,
    pub ensemble: ModelEnsemble,
}

impl ModelBundle {
    pub fn new(transformer: FeatureTransformer, ensemble: ModelEnsemble) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            transformer,
            ensemble,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let bundle: ModelBundle = serde_json::from_reader(reader)?;
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PipelineError::Configuration(format!(
                "bundle {} has format version {}, expected {}",
                path.display(),
                bundle.format_version,
                BUNDLE_FORMAT_VERSION
            )));
        }
        if bundle.ensemble.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "bundle {} holds no models",
                path.display()
            )));
        }
        info!(
            "Loaded bundle {} ({} models, {} features)",
            path.display(),
            bundle.ensemble.len(),
            bundle.transformer.n_features()
        );
        Ok(bundle)
    }

    /// Ensemble probability for raw records
    pub fn predict_proba(&self, records: &[PatientRecord]) -> Vec<f64> {
        let features = self.transformer.transform(records);
        self.ensemble.predict_proba(&features)
    }
}

/// One `predictions.json` entry per row: identifier, the selected raw
/// covariates in table order, risk bucket and 0-100 score.
pub fn prediction_rows(
    table: &PatientTable,
    probabilities: &[f64],
    config: &DataConfig,
) -> Vec<Value> {
    let covariates: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| **c != config.id_column && config.output_covariates.contains(c))
        .collect();

    probabilities
        .iter()
        .enumerate()
        .map(|(row, &p)| {
            let record = &table.records[row];
            let mut entry = Map::new();
            entry.insert(
                "patient_id".to_string(),
                Value::String(table.patient_id(row, config)),
            );
            for name in &covariates {
                entry.insert((*name).clone(), record.get(name).to_json());
            }
            entry.insert(
                "risk_level".to_string(),
                Value::String(RiskLevel::from_probability(p).to_string()),
            );
            entry.insert("risk_score".to_string(), serde_json::json!(risk_score(p)));
            Value::Object(entry)
        })
        .collect()
}

/// Writes artifacts under one output directory
pub struct ArtifactWriter {
    dir: PathBuf,
    output: OutputConfig,
}

impl ArtifactWriter {
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            dir: output.dir_path(),
            output: output.clone(),
        }
    }

    /// Same file names, different directory
    pub fn with_dir<P: Into<PathBuf>>(output: &OutputConfig, dir: P) -> Self {
        Self {
            dir: dir.into(),
            output: output.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_bundle(&self, bundle: &ModelBundle) -> Result<PathBuf> {
        let path = self.dir.join(&self.output.bundle_file);
        bundle.save(&path)?;
        info!("Wrote model bundle to {}", path.display());
        Ok(path)
    }

    pub fn write_predictions(&self, rows: &[Value]) -> Result<PathBuf> {
        let path = self.dir.join(&self.output.predictions_file);
        write_json(&path, rows)?;
        info!("Wrote {} predictions to {}", rows.len(), path.display());
        Ok(path)
    }

    pub fn write_evaluation(&self, report: &EvaluationReport) -> Result<PathBuf> {
        let path = self.dir.join(&self.output.evaluation_file);
        write_json(&path, report)?;
        info!("Wrote evaluation to {}", path.display());
        Ok(path)
    }

    pub fn write_explanations(&self, explanations: &Explanations) -> Result<PathBuf> {
        let path = self.dir.join(&self.output.explanations_file);
        write_json(&path, explanations)?;
        info!(
            "Wrote explanations for {} patients to {}",
            explanations.patients.len(),
            path.display()
        );
        Ok(path)
    }
}

/// Compact JSON, creating parent directories as needed
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
