//! Tests for table ingestion and splitting

use super::*;
use crate::config::DataConfig;
use crate::testing::SyntheticCohort;

const SAMPLE_CSV: &str = "\
patient_id,age,sex,hba1c,risk_level
PAT_1,64,F,7.2,high
PAT_2,51,M,,low
PAT_3,70,M,8.1,critical
PAT_4,45,F,NA,
";

#[test]
fn test_from_reader_parses_cells() {
    let table = PatientTable::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table.columns, vec!["patient_id", "age", "sex", "hba1c", "risk_level"]);
    assert_eq!(table.records[0].get("age").as_f64(), Some(64.0));
    assert!(table.records[1].get("hba1c").is_missing());
    assert!(table.records[3].get("hba1c").is_missing());
}

#[test]
fn test_column_kinds() {
    let table = PatientTable::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
    assert_eq!(table.column_kind("age"), ColumnKind::Numeric);
    assert_eq!(table.column_kind("hba1c"), ColumnKind::Numeric);
    assert_eq!(table.column_kind("sex"), ColumnKind::Categorical);
}

#[test]
fn test_labels_from_risk_level() {
    let table = PatientTable::from_reader(SAMPLE_CSV.as_bytes()).unwrap();
    let labels = table.labels(&DataConfig::default()).unwrap();
    // Missing risk level reads as low
    assert_eq!(labels, vec![1, 0, 1, 0]);
}

#[test]
fn test_labels_derived_from_score() {
    let csv = "patient_id,age,risk_score\nA,50,20\nB,60,66\nC,70,90\nD,55,65\n";
    let table = PatientTable::from_reader(csv.as_bytes()).unwrap();
    let labels = table.labels(&DataConfig::default()).unwrap();
    assert_eq!(labels, vec![0, 1, 1, 0]);
}

#[test]
fn test_missing_target_is_configuration_error() {
    let csv = "patient_id,age\nA,50\n";
    let table = PatientTable::from_reader(csv.as_bytes()).unwrap();
    let err = table.labels(&DataConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}

#[test]
fn test_unknown_risk_level_is_data_error() {
    let csv = "patient_id,risk_level\nA,severe\n";
    let table = PatientTable::from_reader(csv.as_bytes()).unwrap();
    assert!(matches!(
        table.labels(&DataConfig::default()),
        Err(PipelineError::Data(_))
    ));
}

#[test]
fn test_feature_columns_exclude_id_and_label_sources() {
    let csv = "patient_id,age,risk_score,risk_level,hospital_id\nA,50,20,low,H1\n";
    let table = PatientTable::from_reader(csv.as_bytes()).unwrap();
    let config = DataConfig {
        exclude_columns: vec!["hospital_id".to_string()],
        ..DataConfig::default()
    };
    assert_eq!(table.feature_columns(&config), vec!["age"]);
}

#[test]
fn test_patient_id_fallback() {
    let csv = "patient_id,age\n,50\nPAT_9,60\n";
    let table = PatientTable::from_reader(csv.as_bytes()).unwrap();
    let config = DataConfig::default();
    assert_eq!(table.patient_id(0, &config), "row_0");
    assert_eq!(table.patient_id(1, &config), "PAT_9");
}

#[test]
fn test_stratified_split_sizes() {
    let table = SyntheticCohort::new(1000, 0.15, 11).build();
    let labels = table.labels(&DataConfig::default()).unwrap();
    let split = stratified_split(&labels, 0.2, 42).unwrap();

    assert_eq!(split.test.len(), 200);
    assert_eq!(split.train.len(), 800);
    let test_pos = split.test.iter().filter(|&&i| labels[i] == 1).count();
    assert_eq!(test_pos, 30);

    let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..1000).collect::<Vec<_>>());
}

#[test]
fn test_stratified_split_is_seeded() {
    let labels: Vec<u8> = (0..100).map(|i| u8::from(i % 4 == 0)).collect();
    let a = stratified_split(&labels, 0.25, 1).unwrap();
    let b = stratified_split(&labels, 0.25, 1).unwrap();
    let c = stratified_split(&labels, 0.25, 2).unwrap();
    assert_eq!(a, b);
    assert_ne!(a.test, c.test);
}

#[test]
fn test_split_rejects_degenerate_classes() {
    let labels = vec![0, 0, 0, 0, 1];
    assert!(matches!(
        stratified_split(&labels, 0.2, 42),
        Err(PipelineError::Data(_))
    ));
}
