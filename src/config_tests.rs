//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use super::super::error::PipelineError;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.data.id_column, "patient_id");
        assert_eq!(config.data.target_column, "risk_level");
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.split.seed, 42);
        assert!(config.balance.enabled);
        assert_eq!(config.balance.k_neighbors, 5);
        assert_eq!(config.metrics.threshold_points, 61);
        assert_eq!(config.metrics.calibration_bins, 10);
        assert_eq!(config.metrics.decision_threshold, 0.5);
        assert_eq!(config.explain.sample_size, 200);
        assert_eq!(config.explain.global_top_k, 30);
        assert_eq!(config.explain.local_top_k, 10);
        assert_eq!(config.output.predictions_file, "predictions.json");
        assert_eq!(config.output.evaluation_file, "evaluation_trained.json");
        assert_eq!(config.output.explanations_file, "explanations.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_covariates() {
        let config = DataConfig::default();
        assert_eq!(
            config.output_covariates,
            vec!["age", "systolic_bp", "hba1c", "egfr", "bmi", "diabetes_type"]
        );
    }

    #[test]
    fn test_tree_presets() {
        let config = EnsembleConfig::default();
        assert_eq!(config.boosted_trees.n_trees, 300);
        assert_eq!(config.regularized_trees.n_trees, 400);
        assert_eq!(config.boosted_trees.learning_rate, 0.05);
        assert_eq!(config.regularized_trees.learning_rate, 0.05);
        assert_eq!(config.boosted_trees.subsample, 0.9);
        assert_eq!(config.regularized_trees.colsample, 0.8);
        assert_eq!(config.regularized_trees.lambda, 1.0);
        assert_eq!(config.linear.c, 1.0);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml_str = r#"
[ensemble.boosted_trees]
n_trees = 50
enabled = false

[explain.surrogate]
kernel_width = 2.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ensemble.boosted_trees.n_trees, 50);
        assert!(!config.ensemble.boosted_trees.enabled);
        assert_eq!(config.ensemble.boosted_trees.max_depth, 3);
        assert_eq!(config.ensemble.regularized_trees.n_trees, 400);
        assert_eq!(config.explain.surrogate.kernel_width, Some(2.5));
        assert_eq!(config.explain.surrogate.num_samples, 500);
    }

    #[test]
    fn test_data_section() {
        let toml_str = r#"
input = "~/cohort.csv"
exclude_columns = ["hospital_id"]
output_covariates = ["age"]
"#;
        let config: DataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.input, "~/cohort.csv");
        assert_eq!(config.exclude_columns, vec!["hospital_id"]);
        assert_eq!(config.output_covariates, vec!["age"]);
        assert_eq!(config.score_column, "risk_score");
    }

    #[test]
    fn test_output_paths() {
        let config = OutputConfig {
            dir: "out/data".to_string(),
            ..OutputConfig::default()
        };
        assert_eq!(
            config.path_of(&config.bundle_file),
            std::path::PathBuf::from("out/data/ensemble.bundle.json")
        );
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let mut config = Config::default();
        config.split.test_fraction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_trees() {
        let mut config = Config::default();
        config.ensemble.regularized_trees.n_trees = 0;
        assert!(config.validate().is_err());

        // Disabled backends are not checked
        config.ensemble.regularized_trees.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sample() {
        let mut config = Config::default();
        config.explain.sample_size = 0;
        assert!(config.validate().is_err());
        config.explain.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.metrics.threshold_points, 61);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[split]\nseed = 7\n\n[metrics]\nexact = true\n").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.split.seed, 7);
        assert!(config.metrics.exact);
        assert_eq!(config.split.test_fraction, 0.2);
    }
}
