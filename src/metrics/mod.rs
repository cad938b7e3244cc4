//! Evaluation metrics for binary risk scores
//!
//! Implements the dashboard evaluation artifacts:
//! - ROC curve and AUC
//! - Precision-recall curve and AUPRC
//! - Reliability (calibration) bins
//! - Confusion matrix at a fixed decision threshold
//!
//! Any rate whose denominator is zero resolves to 0.

use crate::config::MetricsConfig;
use crate::error::{PipelineError, Result};
use crate::types::round3;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

/// False-positive rate (x) against true-positive rate (y)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<CurvePoint>,
    pub auc: f64,
}

/// Recall (x) against precision (y)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    pub points: Vec<CurvePoint>,
    pub auprc: f64,
}

/// Mean predicted score (xs) and observed positive rate (ys) per bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Score >= threshold counts as a positive prediction
    pub fn from_scores(scores: &[f64], labels: &[u8], threshold: f64) -> Self {
        let mut matrix = Self::default();
        for (&score, &label) in scores.iter().zip(labels) {
            match (score >= threshold, label == 1) {
                (true, true) => matrix.tp += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
                (false, false) => matrix.tn += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn tpr(&self) -> f64 {
        rate(self.tp, self.tp + self.fn_)
    }

    pub fn fpr(&self) -> f64 {
        rate(self.fp, self.fp + self.tn)
    }

    pub fn precision(&self) -> f64 {
        rate(self.tp, self.tp + self.fp)
    }
}

/// Content of `evaluation_trained.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub roc: RocCurve,
    pub pr: PrCurve,
    pub calibration: Calibration,
    pub confusion: ConfusionMatrix,
}

/// Zero denominators resolve to 0
fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Scores sorted descending with cumulative positive counts, so the
/// confusion counts at any threshold are one binary search away.
struct RankedScores {
    scores: Vec<f64>,
    cum_pos: Vec<usize>,
    positives: usize,
}

impl RankedScores {
    fn new(scores: &[f64], labels: &[u8]) -> Self {
        let mut pairs: Vec<(f64, u8)> = scores.iter().copied().zip(labels.iter().copied()).collect();
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut cum_pos = Vec::with_capacity(pairs.len() + 1);
        cum_pos.push(0);
        for (_, label) in &pairs {
            let last = cum_pos.last().copied().unwrap_or(0);
            cum_pos.push(last + usize::from(*label == 1));
        }
        let positives = cum_pos.last().copied().unwrap_or(0);

        Self {
            scores: pairs.into_iter().map(|(s, _)| s).collect(),
            cum_pos,
            positives,
        }
    }

    fn at(&self, threshold: f64) -> ConfusionMatrix {
        let predicted = self.scores.partition_point(|&s| s >= threshold);
        let tp = self.cum_pos[predicted];
        let fp = predicted - tp;
        let negatives = self.scores.len() - self.positives;
        ConfusionMatrix {
            tn: negatives - fp,
            fp,
            fn_: self.positives - tp,
            tp,
        }
    }
}

/// Sort by x; ties keep sweep order (descending threshold), which is the
/// direction both curves are traced in. Adjacent duplicates are dropped.
fn order_points(points: Vec<CurvePoint>) -> Vec<CurvePoint> {
    let mut sorted = points;
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));
    sorted.dedup();
    sorted
}

fn trapezoid(points: &[CurvePoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].x - w[0].x) * (w[1].y + w[0].y) / 2.0)
        .sum()
}

pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Compute every evaluation artifact for one (scores, labels) pair
    pub fn evaluate(&self, scores: &[f64], labels: &[u8]) -> Result<EvaluationReport> {
        if scores.len() != labels.len() {
            return Err(PipelineError::Data(format!(
                "scores ({}) and labels ({}) differ in length",
                scores.len(),
                labels.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(PipelineError::Data("non-finite score".to_string()));
        }

        let report = EvaluationReport {
            roc: self.roc(scores, labels),
            pr: self.pr(scores, labels),
            calibration: self.calibration(scores, labels),
            confusion: ConfusionMatrix::from_scores(scores, labels, self.config.decision_threshold),
        };
        info!(
            "Evaluation on {} rows: AUC={:.3} AUPRC={:.3} confusion={:?}",
            scores.len(),
            report.roc.auc,
            report.pr.auprc,
            report.confusion
        );
        Ok(report)
    }

    /// Sweep thresholds, highest first
    pub fn thresholds(&self, scores: &[f64]) -> Vec<f64> {
        if self.config.exact {
            let mut distinct = scores.to_vec();
            distinct.sort_by(|a, b| b.total_cmp(a));
            distinct.dedup();
            distinct
        } else {
            let steps = self.config.threshold_points.max(2) - 1;
            (0..=steps).rev().map(|i| i as f64 / steps as f64).collect()
        }
    }

    pub fn roc(&self, scores: &[f64], labels: &[u8]) -> RocCurve {
        let ranked = RankedScores::new(scores, labels);
        let mut points = vec![CurvePoint { x: 0.0, y: 0.0 }];
        for t in self.thresholds(scores) {
            let cm = ranked.at(t);
            points.push(CurvePoint {
                x: cm.fpr(),
                y: cm.tpr(),
            });
        }
        let points = order_points(points);
        let auc = round3(trapezoid(&points));
        RocCurve { points, auc }
    }

    pub fn pr(&self, scores: &[f64], labels: &[u8]) -> PrCurve {
        let ranked = RankedScores::new(scores, labels);
        let mut points = vec![CurvePoint { x: 0.0, y: 1.0 }];
        for t in self.thresholds(scores) {
            let cm = ranked.at(t);
            // Nothing predicted positive: the anchor stands in for this point
            if cm.tp + cm.fp == 0 {
                continue;
            }
            points.push(CurvePoint {
                x: cm.tpr(),
                y: cm.precision(),
            });
        }
        let points = order_points(points);
        let auprc = round3(trapezoid(&points));
        PrCurve { points, auprc }
    }

    /// Equal-width bins over [0, 1); empty bins report (midpoint, 0)
    pub fn calibration(&self, scores: &[f64], labels: &[u8]) -> Calibration {
        let bins = self.config.calibration_bins.max(1);
        let mut xs = Vec::with_capacity(bins);
        let mut ys = Vec::with_capacity(bins);

        for i in 0..bins {
            let lo = i as f64 / bins as f64;
            let hi = (i + 1) as f64 / bins as f64;
            let (mut sum, mut hits, mut count) = (0.0, 0usize, 0usize);
            for (&score, &label) in scores.iter().zip(labels) {
                if score >= lo && score < hi {
                    sum += score;
                    hits += usize::from(label == 1);
                    count += 1;
                }
            }
            if count == 0 {
                xs.push((lo + hi) / 2.0);
                ys.push(0.0);
            } else {
                xs.push(sum / count as f64);
                ys.push(rate(hits, count));
            }
        }
        Calibration { xs, ys }
    }
}
