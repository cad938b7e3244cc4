//! Core types shared across the pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell of the patient table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl FieldValue {
    /// Parse a raw CSV cell. Empty strings and the usual null spellings are missing.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "None" => FieldValue::Missing,
            _ => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => FieldValue::Numeric(v),
                _ => FieldValue::Categorical(trimmed.to_string()),
            },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// Categorical view of the cell; numeric values are rendered as text
    pub fn as_category(&self) -> Option<String> {
        match self {
            FieldValue::Categorical(s) => Some(s.clone()),
            FieldValue::Numeric(v) => Some(v.to_string()),
            FieldValue::Missing => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Numeric(v) => serde_json::json!(v),
            FieldValue::Categorical(s) => serde_json::Value::String(s.clone()),
            FieldValue::Missing => serde_json::Value::Null,
        }
    }
}

/// One row of the processed patient table: feature name -> scalar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub fields: HashMap<String, FieldValue>,
}

impl PatientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Missing when the column is absent from this record
    pub fn get(&self, name: &str) -> &FieldValue {
        static MISSING: FieldValue = FieldValue::Missing;
        self.fields.get(name).unwrap_or(&MISSING)
    }
}

/// Dashboard risk bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket an ensemble probability. Boundaries are inclusive on the upper side.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.85 {
            RiskLevel::Critical
        } else if p >= 0.65 {
            RiskLevel::High
        } else if p >= 0.35 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    /// Bucket a 0-100 risk score with right-inclusive bins
    /// (-1,35] low, (35,65] moderate, (65,85] high, (85,101] critical.
    pub fn from_score(score: f64) -> Self {
        if score > 85.0 {
            RiskLevel::Critical
        } else if score > 65.0 {
            RiskLevel::High
        } else if score > 35.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    /// Case-insensitive parse of a stored category
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "moderate" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// Binary training label: high and critical are positive
    pub fn label(&self) -> u8 {
        match self {
            RiskLevel::High | RiskLevel::Critical => 1,
            RiskLevel::Low | RiskLevel::Moderate => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard score: probability as a percentage with one decimal
pub fn risk_score(probability: f64) -> f64 {
    (probability * 100.0 * 10.0).round() / 10.0
}

/// Round to three decimals, used for curve summaries
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
