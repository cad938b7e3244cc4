//! Tests for the explainability engine

use super::*;
use crate::config::{EnsembleConfig, SurrogateConfig, TreeConfig};
use crate::ml::{Capabilities, Classifier};
use crate::testing::SyntheticCohort;

struct Fixture {
    table: PatientTable,
    transformer: FeatureTransformer,
    features: FeatureMatrix,
    ensemble: ModelEnsemble,
}

fn fixture(caps: Capabilities) -> Fixture {
    let table = SyntheticCohort::new(160, 0.2, 21).build();
    let data = DataConfig::default();
    let labels = table.labels(&data).unwrap();
    let transformer = FeatureTransformer::fit(&table, &table.feature_columns(&data)).unwrap();
    let features = transformer.transform_table(&table);

    let config = EnsembleConfig {
        boosted_trees: TreeConfig {
            n_trees: 20,
            ..TreeConfig::default()
        },
        regularized_trees: TreeConfig {
            n_trees: 20,
            ..TreeConfig::regularized()
        },
        ..EnsembleConfig::default()
    };
    let mut ensemble = ModelEnsemble::with_capabilities(&config, caps).unwrap();
    ensemble.fit(&features, &labels).unwrap();

    Fixture {
        table,
        transformer,
        features,
        ensemble,
    }
}

fn all_trees() -> Capabilities {
    Capabilities {
        boosted_trees: true,
        regularized_trees: true,
    }
}

fn config() -> ExplainConfig {
    ExplainConfig {
        sample_size: 40,
        local_top_k: 1000,
        surrogate: SurrogateConfig {
            num_samples: 200,
            ..SurrogateConfig::default()
        },
        ..ExplainConfig::default()
    }
}

fn full_backends() -> Backends {
    Backends {
        attribution: true,
        surrogate: true,
    }
}

fn run(f: &Fixture, engine: &ExplainabilityEngine) -> Explanations {
    engine.explain(
        &f.ensemble,
        &f.transformer,
        &f.table,
        &f.features,
        &DataConfig::default(),
    )
}

fn assert_additive(f: &Fixture, engine: &ExplainabilityEngine, out: &Explanations) {
    let representative = f.ensemble.representative().unwrap().classifier();
    let rows = engine.sample_rows(f.table.len());
    assert_eq!(out.patients.len(), rows.len());
    for row in rows {
        let id = f.table.patient_id(row, &DataConfig::default());
        let explanation = &out.patients[&id];
        let total = explanation.base_value
            + explanation
                .contributions
                .iter()
                .map(|c| c.contribution)
                .sum::<f64>();
        let margin = representative.decision_function(f.features.row(row));
        assert!((total - margin).abs() < 1e-6, "{}: {} vs {}", id, total, margin);
    }
}

#[test]
fn test_tree_path_is_additive() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(config(), full_backends());
    let out = run(&f, &engine);
    assert_additive(&f, &engine, &out);
}

#[test]
fn test_linear_path_is_additive() {
    let f = fixture(Capabilities::none());
    let engine = ExplainabilityEngine::with_backends(config(), full_backends());
    let out = run(&f, &engine);
    assert_additive(&f, &engine, &out);
}

#[test]
fn test_global_importance_sorted_and_bounded() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(
        ExplainConfig {
            global_top_k: 5,
            ..config()
        },
        full_backends(),
    );
    let out = run(&f, &engine);
    assert_eq!(out.global_importance.len(), 5);
    assert!(out
        .global_importance
        .windows(2)
        .all(|w| w[0].importance >= w[1].importance));
    assert!(out.global_importance.iter().all(|g| g.importance >= 0.0));
}

#[test]
fn test_local_top_k_limits_contributions() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(
        ExplainConfig {
            local_top_k: 10,
            ..config()
        },
        full_backends(),
    );
    let out = run(&f, &engine);
    for explanation in out.patients.values() {
        assert_eq!(explanation.contributions.len(), 10);
        assert!(explanation
            .contributions
            .windows(2)
            .all(|w| w[0].contribution.abs() >= w[1].contribution.abs()));
    }
}

#[test]
fn test_missing_backends_yield_empty_sections() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(config(), Backends::none());
    let out = run(&f, &engine);
    assert!(out.patients.is_empty());
    assert!(out.global_importance.is_empty());
    assert!(out.lime.is_none());

    let json = serde_json::to_value(&out).unwrap();
    assert!(json["patients"].as_object().is_some_and(|m| m.is_empty()));
    assert!(json.get("lime").is_none());
}

#[test]
fn test_surrogate_section_for_first_sampled_patient() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(config(), full_backends());
    let out = run(&f, &engine);
    let lime = out.lime.expect("surrogate section");
    assert_eq!(lime.len(), 1);

    let first = engine.sample_rows(f.table.len())[0];
    let id = f.table.patient_id(first, &DataConfig::default());
    let weights = &lime[&id];
    assert_eq!(weights.len(), 10);
    assert!(weights
        .windows(2)
        .all(|w| w[0].weight.abs() >= w[1].weight.abs()));
}

#[test]
fn test_disabled_engine_is_empty() {
    let f = fixture(Capabilities::none());
    let engine = ExplainabilityEngine::with_backends(
        ExplainConfig {
            enabled: false,
            ..config()
        },
        full_backends(),
    );
    assert!(run(&f, &engine).is_empty());
}

#[test]
fn test_sample_is_seeded_and_bounded() {
    let engine = ExplainabilityEngine::with_backends(config(), full_backends());
    let a = engine.sample_rows(500);
    assert_eq!(a.len(), 40);
    assert_eq!(a, engine.sample_rows(500));
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(engine.sample_rows(10).len(), 10);
}

#[test]
fn test_explanations_are_deterministic() {
    let f = fixture(all_trees());
    let engine = ExplainabilityEngine::with_backends(config(), full_backends());
    assert_eq!(run(&f, &engine), run(&f, &engine));
}
