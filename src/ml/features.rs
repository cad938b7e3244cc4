//! Feature transformer
//!
//! Standard-scales numeric columns and one-hot encodes categorical ones.
//! State is learned once from training rows and then frozen; `transform` is
//! total: unseen categories encode as all zeros and residual missing numerics
//! are imputed with the training median.

use crate::data::{ColumnKind, PatientTable};
use crate::error::{PipelineError, Result};
use crate::types::PatientRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Dense row-major numeric matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            debug_assert_eq!(row.len(), cols);
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    pub fn push_row(&mut self, row: &[f64]) {
        assert_eq!(row.len(), self.cols, "row width must match matrix");
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    /// Rows picked by index, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.get(i, j)).collect()
    }

    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.cols];
        if self.rows == 0 {
            return means;
        }
        for i in 0..self.rows {
            for (m, v) in means.iter_mut().zip(self.row(i)) {
                *m += v;
            }
        }
        for m in means.iter_mut() {
            *m /= self.rows as f64;
        }
        means
    }

    /// Population standard deviation per column
    pub fn column_stds(&self) -> Vec<f64> {
        let means = self.column_means();
        let mut vars = vec![0.0; self.cols];
        if self.rows == 0 {
            return vars;
        }
        for i in 0..self.rows {
            for (j, v) in self.row(i).iter().enumerate() {
                let d = v - means[j];
                vars[j] += d * d;
            }
        }
        vars.iter().map(|v| (v / self.rows as f64).sqrt()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub center: f64,
    pub scale: f64,
    /// Fallback for cells upstream failed to impute
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    /// Sorted vocabulary observed in training rows
    pub categories: Vec<String>,
}

/// Frozen preprocessing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransformer {
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
    feature_names: Vec<String>,
}

impl FeatureTransformer {
    /// Learn scaling and vocabularies from the training rows
    pub fn fit(train: &PatientTable, columns: &[String]) -> Result<Self> {
        if train.is_empty() {
            return Err(PipelineError::Data(
                "cannot fit transformer on zero rows".to_string(),
            ));
        }
        if columns.is_empty() {
            return Err(PipelineError::Data("no feature columns".to_string()));
        }

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for name in columns {
            match train.column_kind(name) {
                ColumnKind::Numeric => {
                    let values: Vec<f64> = train
                        .records
                        .iter()
                        .filter_map(|r| r.get(name).as_f64())
                        .collect();
                    numeric.push(fit_numeric(name, &values));
                }
                ColumnKind::Categorical => {
                    let mut categories: Vec<String> = train
                        .records
                        .iter()
                        .filter_map(|r| r.get(name).as_category())
                        .collect();
                    categories.sort();
                    categories.dedup();
                    categorical.push(CategoricalColumn {
                        name: name.clone(),
                        categories,
                    });
                }
            }
        }

        let mut feature_names: Vec<String> =
            numeric.iter().map(|c| format!("num__{}", c.name)).collect();
        for column in &categorical {
            for category in &column.categories {
                feature_names.push(format!("cat__{}_{}", column.name, category));
            }
        }

        info!(
            "Fitted transformer: {} numeric, {} categorical -> {} features",
            numeric.len(),
            categorical.len(),
            feature_names.len()
        );

        Ok(Self {
            numeric,
            categorical,
            feature_names,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn numeric_columns(&self) -> &[NumericColumn] {
        &self.numeric
    }

    pub fn categorical_columns(&self) -> &[CategoricalColumn] {
        &self.categorical
    }

    /// Apply the frozen state to any row set
    pub fn transform(&self, records: &[PatientRecord]) -> FeatureMatrix {
        let mut matrix = FeatureMatrix::zeros(records.len(), self.n_features());
        let mut imputed = 0usize;

        for (i, record) in records.iter().enumerate() {
            for (j, column) in self.numeric.iter().enumerate() {
                let raw = match record.get(&column.name).as_f64() {
                    Some(v) => v,
                    None => {
                        imputed += 1;
                        column.median
                    }
                };
                matrix.set(i, j, (raw - column.center) / column.scale);
            }

            let mut offset = self.numeric.len();
            for column in &self.categorical {
                if let Some(value) = record.get(&column.name).as_category() {
                    if let Ok(k) = column.categories.binary_search(&value) {
                        matrix.set(i, offset + k, 1.0);
                    }
                }
                offset += column.categories.len();
            }
        }

        if imputed > 0 {
            debug!("Imputed {} missing numeric cells with training medians", imputed);
        }
        matrix
    }

    pub fn transform_table(&self, table: &PatientTable) -> FeatureMatrix {
        self.transform(&table.records)
    }
}

fn fit_numeric(name: &str, values: &[f64]) -> NumericColumn {
    if values.is_empty() {
        return NumericColumn {
            name: name.to_string(),
            center: 0.0,
            scale: 1.0,
            median: 0.0,
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    NumericColumn {
        name: name.to_string(),
        center: mean,
        scale: if std > 1e-12 { std } else { 1.0 },
        median,
    }
}
