//! Tests for curve, calibration and confusion computations

use super::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn engine() -> MetricsEngine {
    MetricsEngine::new(MetricsConfig::default())
}

fn exact_engine() -> MetricsEngine {
    MetricsEngine::new(MetricsConfig {
        exact: true,
        ..MetricsConfig::default()
    })
}

fn separable() -> (Vec<f64>, Vec<u8>) {
    let mut scores = Vec::new();
    let mut labels = Vec::new();
    for i in 0..85 {
        scores.push(0.05 + 0.3 * i as f64 / 85.0);
        labels.push(0);
    }
    for i in 0..15 {
        scores.push(0.7 + 0.25 * i as f64 / 15.0);
        labels.push(1);
    }
    (scores, labels)
}

#[test]
fn test_separable_curves_reach_one() {
    let (scores, labels) = separable();
    for engine in [engine(), exact_engine()] {
        let report = engine.evaluate(&scores, &labels).unwrap();
        assert!((report.roc.auc - 1.0).abs() <= 0.001);
        assert!((report.pr.auprc - 1.0).abs() <= 0.001);
    }
}

#[test]
fn test_random_scores_auc_near_half() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let scores: Vec<f64> = (0..20_000).map(|_| rng.random::<f64>()).collect();
    let labels: Vec<u8> = (0..20_000).map(|_| u8::from(rng.random::<f64>() < 0.3)).collect();
    let roc = engine().roc(&scores, &labels);
    assert!((roc.auc - 0.5).abs() <= 0.05, "auc was {}", roc.auc);
}

#[test]
fn test_inverted_scores_auc_zero() {
    let (scores, labels) = separable();
    let inverted: Vec<f64> = scores.iter().map(|s| 1.0 - s).collect();
    assert!(engine().roc(&inverted, &labels).auc <= 0.001);
}

#[test]
fn test_points_sorted_by_x() {
    let (scores, labels) = separable();
    let report = engine().evaluate(&scores, &labels).unwrap();
    for curve in [&report.roc.points, &report.pr.points] {
        assert!(curve.windows(2).all(|w| w[0].x <= w[1].x));
        assert!(curve.iter().all(|p| (0.0..=1.0).contains(&p.x)));
        assert!(curve.iter().all(|p| (0.0..=1.0).contains(&p.y)));
    }
}

#[test]
fn test_roc_rounded_to_three_decimals() {
    let scores = vec![0.1, 0.4, 0.35, 0.8];
    let labels = vec![0, 0, 1, 1];
    let auc = exact_engine().roc(&scores, &labels).auc;
    assert_eq!(auc, 0.75);
    assert_eq!((auc * 1000.0).round() / 1000.0, auc);
}

#[test]
fn test_confusion_counts_sum_to_n() {
    let (scores, labels) = separable();
    let cm = ConfusionMatrix::from_scores(&scores, &labels, 0.5);
    assert_eq!(cm.total(), scores.len());
    assert_eq!(cm, ConfusionMatrix { tn: 85, fp: 0, fn_: 0, tp: 15 });
}

#[test]
fn test_confusion_threshold_inclusive() {
    let cm = ConfusionMatrix::from_scores(&[0.5, 0.49], &[1, 0], 0.5);
    assert_eq!(cm.tp, 1);
    assert_eq!(cm.tn, 1);
}

#[test]
fn test_zero_denominators_resolve_to_zero() {
    // No positives at all
    let scores = vec![0.2, 0.6, 0.9];
    let labels = vec![0, 0, 0];
    let report = engine().evaluate(&scores, &labels).unwrap();
    assert!(report.roc.points.iter().all(|p| p.y == 0.0));
    assert_eq!(report.roc.auc, 0.0);

    let cm = ConfusionMatrix::default();
    assert_eq!(cm.tpr(), 0.0);
    assert_eq!(cm.fpr(), 0.0);
    assert_eq!(cm.precision(), 0.0);
}

#[test]
fn test_empty_input() {
    let report = engine().evaluate(&[], &[]).unwrap();
    assert_eq!(report.confusion.total(), 0);
    assert_eq!(report.calibration.xs.len(), 10);
}

#[test]
fn test_calibration_bins_within_bounds() {
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let scores: Vec<f64> = (0..500).map(|_| rng.random::<f64>().powi(2)).collect();
    let labels: Vec<u8> = scores
        .iter()
        .map(|s| u8::from(rng.random::<f64>() < *s))
        .collect();
    let calibration = engine().calibration(&scores, &labels);

    assert_eq!(calibration.xs.len(), 10);
    for (i, (&x, &y)) in calibration.xs.iter().zip(&calibration.ys).enumerate() {
        let lo = i as f64 / 10.0;
        let hi = (i + 1) as f64 / 10.0;
        assert!(x >= lo && x < hi, "bin {} mean {} outside [{}, {})", i, x, lo, hi);
        assert!((0.0..=1.0).contains(&y));
    }
}

#[test]
fn test_empty_calibration_bin_reports_midpoint() {
    let calibration = engine().calibration(&[0.05, 0.07], &[0, 1]);
    assert!((calibration.xs[0] - 0.06).abs() < 1e-12);
    assert!((calibration.ys[0] - 0.5).abs() < 1e-12);
    assert!((calibration.xs[5] - 0.55).abs() < 1e-12);
    assert_eq!(calibration.ys[5], 0.0);
}

#[test]
fn test_default_thresholds() {
    let thresholds = engine().thresholds(&[]);
    assert_eq!(thresholds.len(), 61);
    assert_eq!(thresholds[0], 1.0);
    assert_eq!(thresholds[60], 0.0);
}

#[test]
fn test_length_mismatch_is_data_error() {
    assert!(matches!(
        engine().evaluate(&[0.1], &[0, 1]),
        Err(PipelineError::Data(_))
    ));
}

#[test]
fn test_report_json_shape() {
    let (scores, labels) = separable();
    let report = engine().evaluate(&scores, &labels).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["roc"]["points"][0]["x"].is_number());
    assert!(json["roc"]["auc"].is_number());
    assert!(json["pr"]["auprc"].is_number());
    assert_eq!(json["calibration"]["xs"].as_array().map(Vec::len), Some(10));
    assert_eq!(json["confusion"]["fn"], 0);
    assert_eq!(json["confusion"]["tp"], 15);
}
