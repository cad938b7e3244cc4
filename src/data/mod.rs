//! Patient table ingestion, label derivation and the stratified split

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use crate::types::{FieldValue, PatientRecord, RiskLevel};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// Inferred storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Processed patient table in input column order
#[derive(Debug, Clone, Default)]
pub struct PatientTable {
    pub columns: Vec<String>,
    pub records: Vec<PatientRecord>,
}

impl PatientTable {
    pub fn new(columns: Vec<String>, records: Vec<PatientRecord>) -> Self {
        Self { columns, records }
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(
            "Loaded {} patients x {} columns from {}",
            table.len(),
            table.columns.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let mut record = PatientRecord::new();
            for (name, raw) in columns.iter().zip(row.iter()) {
                record.insert(name, FieldValue::parse(raw));
            }
            records.push(record);
        }

        Ok(Self { columns, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Numeric when every present cell is a number. Fully empty columns count as numeric.
    pub fn column_kind(&self, name: &str) -> ColumnKind {
        let categorical = self
            .records
            .iter()
            .any(|r| matches!(r.get(name), FieldValue::Categorical(_)));
        if categorical {
            ColumnKind::Categorical
        } else {
            ColumnKind::Numeric
        }
    }

    /// Model inputs: every column except identifier, label sources and exclusions
    pub fn feature_columns(&self, config: &DataConfig) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| {
                **c != config.id_column
                    && **c != config.target_column
                    && **c != config.score_column
                    && !config.exclude_columns.contains(c)
            })
            .cloned()
            .collect()
    }

    /// Subset of rows, preserving column layout
    pub fn select(&self, indices: &[usize]) -> PatientTable {
        PatientTable {
            columns: self.columns.clone(),
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }

    /// Dashboard key of a row: its identifier, or `row_<index>`
    pub fn patient_id(&self, row: usize, config: &DataConfig) -> String {
        match self.records[row].get(&config.id_column) {
            FieldValue::Categorical(s) => s.clone(),
            FieldValue::Numeric(v) => v.to_string(),
            FieldValue::Missing => format!("row_{}", row),
        }
    }

    /// Risk category per row. Falls back to bucketing the numeric score when
    /// the category column is absent; missing categories read as low.
    pub fn risk_levels(&self, config: &DataConfig) -> Result<Vec<RiskLevel>> {
        if self.has_column(&config.target_column) {
            return self
                .records
                .iter()
                .map(|r| match r.get(&config.target_column) {
                    FieldValue::Missing => Ok(RiskLevel::Low),
                    value => {
                        let raw = value.as_category().unwrap_or_default();
                        RiskLevel::parse(&raw).ok_or_else(|| {
                            PipelineError::Data(format!(
                                "unrecognised {} value '{}'",
                                config.target_column, raw
                            ))
                        })
                    }
                })
                .collect();
        }

        if self.has_column(&config.score_column) {
            debug!(
                "Deriving {} from {}",
                config.target_column, config.score_column
            );
            return Ok(self
                .records
                .iter()
                .map(|r| match r.get(&config.score_column).as_f64() {
                    Some(score) => RiskLevel::from_score(score),
                    None => RiskLevel::Low,
                })
                .collect());
        }

        Err(PipelineError::Configuration(format!(
            "target column '{}' is absent and no '{}' to derive it from",
            config.target_column, config.score_column
        )))
    }

    /// Binary labels: high/critical -> 1
    pub fn labels(&self, config: &DataConfig) -> Result<Vec<u8>> {
        Ok(self
            .risk_levels(config)?
            .iter()
            .map(|level| level.label())
            .collect())
    }
}

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified split with `ceil(test_fraction * n)` held-out rows, allocated to
/// classes by largest remainder and shuffled with a dedicated seed.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<Split> {
    let n = labels.len();
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        by_class[usize::from(label.min(1))].push(i);
    }

    for (class, members) in by_class.iter().enumerate() {
        if members.len() < 2 {
            return Err(PipelineError::Data(format!(
                "class {} has {} rows; at least 2 are needed to split",
                class,
                members.len()
            )));
        }
    }

    let n_test = ((test_fraction * n as f64).ceil() as usize).clamp(2, n - 2);

    // Largest-remainder allocation of the held-out rows
    let exact: Vec<f64> = by_class
        .iter()
        .map(|m| n_test as f64 * m.len() as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = n_test - alloc.iter().sum::<usize>();
    let mut order: Vec<usize> = vec![0, 1];
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        alloc[class] += 1;
        remaining -= 1;
    }
    // Every class keeps at least one row on each side
    for class in 0..2 {
        let size = by_class[class].len();
        alloc[class] = alloc[class].clamp(1, size - 1);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n);
    let mut test = Vec::with_capacity(n_test);
    for (class, members) in by_class.iter().enumerate() {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        test.extend_from_slice(&shuffled[..alloc[class]]);
        train.extend_from_slice(&shuffled[alloc[class]..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    info!(
        "Split {} rows into {} train / {} test (seed {})",
        n,
        train.len(),
        test.len(),
        seed
    );
    Ok(Split { train, test })
}
