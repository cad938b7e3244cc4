//! Patient Risk Pipeline
//!
//! Trains a small model ensemble on a processed patient table, evaluates it
//! on a held-out split, explains its predictions and writes the JSON
//! artifacts consumed by the clinical monitoring dashboard.
//!
//! ## Architecture
//!
//! ```text
//! PatientTable → split → FeatureTransformer → ClassBalancer → ModelEnsemble
//!                                                                  ↓
//!                  ArtifactWriter ← ExplainabilityEngine ← MetricsEngine
//! ```

pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod ml;
pub mod pipeline;
pub mod testing;
pub mod types;
pub mod utils;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
mod config_tests;
