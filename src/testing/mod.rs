//! Seeded synthetic cohorts for tests and local dry runs
//!
//! Produces tables shaped like the processed upstream dataset: numeric
//! vitals/labs with a few missing cells, categorical demographics, and a
//! risk_level column with an exact positive (high/critical) rate.

use crate::data::PatientTable;
use crate::types::{FieldValue, PatientRecord};
use crate::utils::normal;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const COHORT_COLUMNS: [&str; 15] = [
    "patient_id",
    "age",
    "sex",
    "bmi",
    "systolic_bp",
    "diastolic_bp",
    "heart_rate",
    "hba1c",
    "egfr",
    "ldl_cholesterol",
    "statin_adherence",
    "missed_appointments_6mo",
    "diabetes_type",
    "smoking_status",
    "risk_level",
];

/// Builder for a synthetic patient table
#[derive(Debug, Clone)]
pub struct SyntheticCohort {
    pub patients: usize,
    pub positive_rate: f64,
    pub missing_rate: f64,
    pub seed: u64,
}

impl SyntheticCohort {
    pub fn new(patients: usize, positive_rate: f64, seed: u64) -> Self {
        Self {
            patients,
            positive_rate,
            missing_rate: 0.03,
            seed,
        }
    }

    pub fn with_missing_rate(mut self, rate: f64) -> Self {
        self.missing_rate = rate;
        self
    }

    pub fn build(&self) -> PatientTable {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut records = Vec::with_capacity(self.patients);
        let mut latent = Vec::with_capacity(self.patients);

        for i in 0..self.patients {
            let age = rng.random_range(18.0..90.0_f64).round();
            let sex = if rng.random::<f64>() < 0.52 { "F" } else { "M" };
            let bmi = (26.0 + 4.5 * normal(&mut rng) + (age - 50.0) * 0.03).clamp(16.0, 50.0);
            let systolic = 120.0 + 0.4 * (age - 50.0) + 15.0 * normal(&mut rng);
            let diastolic = 0.55 * systolic + 8.0 * normal(&mut rng) + 10.0;
            let heart_rate = 72.0 + 10.0 * normal(&mut rng);
            let diabetes_type = match rng.random::<f64>() {
                p if p < 0.55 => "None",
                p if p < 0.93 => "Type 2",
                _ => "Type 1",
            };
            let hba1c = if diabetes_type == "None" {
                5.4 + 0.4 * normal(&mut rng)
            } else {
                7.6 + 1.3 * normal(&mut rng)
            };
            let egfr = (95.0 - 0.7 * (age - 30.0).max(0.0) + 14.0 * normal(&mut rng)).clamp(8.0, 130.0);
            let ldl = 115.0 + 30.0 * normal(&mut rng);
            let adherence = rng.random_range(0.3..1.0_f64);
            let missed = (rng.random::<f64>() * 4.0).floor();
            let smoking = match rng.random::<f64>() {
                p if p < 0.6 => "never",
                p if p < 0.85 => "former",
                _ => "current",
            };

            let score = 0.04 * (age - 55.0)
                + 0.03 * (systolic - 130.0)
                + 0.5 * (hba1c - 6.0)
                - 0.04 * (egfr - 80.0)
                + 0.05 * (bmi - 27.0)
                - 1.5 * (adherence - 0.65)
                + 0.3 * missed
                + if smoking == "current" { 0.6 } else { 0.0 }
                + 0.8 * normal(&mut rng);
            latent.push(score);

            let mut record = PatientRecord::new()
                .with("patient_id", FieldValue::Categorical(format!("PAT_{:06}", i + 1)))
                .with("age", FieldValue::Numeric(age))
                .with("sex", FieldValue::Categorical(sex.to_string()))
                .with("bmi", FieldValue::Numeric(round1(bmi)))
                .with("systolic_bp", FieldValue::Numeric(systolic.round()))
                .with("diastolic_bp", FieldValue::Numeric(diastolic.round()))
                .with("heart_rate", FieldValue::Numeric(heart_rate.round()))
                .with("ldl_cholesterol", FieldValue::Numeric(ldl.round()))
                .with("statin_adherence", FieldValue::Numeric(round1(adherence * 100.0) / 100.0))
                .with("missed_appointments_6mo", FieldValue::Numeric(missed))
                .with("diabetes_type", FieldValue::Categorical(diabetes_type.to_string()))
                .with("smoking_status", FieldValue::Categorical(smoking.to_string()));

            for (name, value) in [("hba1c", round1(hba1c)), ("egfr", egfr.round())] {
                let cell = if rng.random::<f64>() < self.missing_rate {
                    FieldValue::Missing
                } else {
                    FieldValue::Numeric(value)
                };
                record.insert(name, cell);
            }
            records.push(record);
        }

        // Exact positive count: the top latent scores become high/critical
        let positives = (self.patients as f64 * self.positive_rate).round() as usize;
        let mut order: Vec<usize> = (0..self.patients).collect();
        order.sort_by(|&a, &b| {
            latent[b]
                .partial_cmp(&latent[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (rank, &row) in order.iter().enumerate() {
            let level = if rank < positives / 4 {
                "critical"
            } else if rank < positives {
                "high"
            } else if rank < positives + self.patients / 3 {
                "moderate"
            } else {
                "low"
            };
            records[row].insert("risk_level", FieldValue::Categorical(level.to_string()));
        }

        PatientTable::new(COHORT_COLUMNS.iter().map(|c| c.to_string()).collect(), records)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
