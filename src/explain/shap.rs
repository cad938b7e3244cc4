//! Additive feature attribution
//!
//! Both explainers work in log-odds space and satisfy
//! `expected_value + sum(attributions) == decision_function(row)`.
//!
//! The tree explainer is the polynomial-time path-dependent algorithm: each
//! root-to-leaf walk tracks the fraction of cover flowing through every
//! feature seen so far and the permutation weights of the features on the
//! path, so exact Shapley values fall out in O(leaves * depth^2) per tree.

use crate::error::{PipelineError, Result};
use crate::ml::{BoostedTrees, FeatureMatrix, LogisticModel, Node, Tree};

/// Explainer over one fitted model
pub trait Explainer {
    /// Baseline margin every attribution is measured from
    fn expected_value(&self) -> f64;

    /// Signed per-feature contribution for one transformed row
    fn attributions(&self, row: &[f64]) -> Result<Vec<f64>>;
}

fn check_width(row: &[f64], expected: usize) -> Result<()> {
    if row.len() != expected {
        return Err(PipelineError::Explainability(format!(
            "row has {} features, explainer expects {}",
            row.len(),
            expected
        )));
    }
    Ok(())
}

fn check_finite(values: Vec<f64>) -> Result<Vec<f64>> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(values)
    } else {
        Err(PipelineError::Explainability(
            "attribution produced a non-finite value".to_string(),
        ))
    }
}

/// `w_j * (x_j - mean_j)` against a background sample
pub struct LinearExplainer<'a> {
    model: &'a LogisticModel,
    means: Vec<f64>,
}

impl<'a> LinearExplainer<'a> {
    pub fn new(model: &'a LogisticModel, background: &FeatureMatrix) -> Result<Self> {
        if model.coefficients().len() != background.cols() {
            return Err(PipelineError::Explainability(format!(
                "model has {} coefficients but background has {} columns",
                model.coefficients().len(),
                background.cols()
            )));
        }
        if background.rows() == 0 {
            return Err(PipelineError::Explainability(
                "empty background sample".to_string(),
            ));
        }
        Ok(Self {
            model,
            means: background.column_means(),
        })
    }
}

impl Explainer for LinearExplainer<'_> {
    fn expected_value(&self) -> f64 {
        self.model.intercept()
            + self
                .model
                .coefficients()
                .iter()
                .zip(&self.means)
                .map(|(w, m)| w * m)
                .sum::<f64>()
    }

    fn attributions(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_width(row, self.means.len())?;
        check_finite(
            self.model
                .coefficients()
                .iter()
                .zip(row)
                .zip(&self.means)
                .map(|((w, x), m)| w * (x - m))
                .collect(),
        )
    }
}

pub struct TreeExplainer<'a> {
    model: &'a BoostedTrees,
    n_features: usize,
}

impl<'a> TreeExplainer<'a> {
    pub fn new(model: &'a BoostedTrees, n_features: usize) -> Result<Self> {
        if model.trees().is_empty() {
            return Err(PipelineError::Explainability(
                "tree model has not been fitted".to_string(),
            ));
        }
        let max_feature = model
            .trees()
            .iter()
            .flat_map(|t| t.nodes())
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max();
        if max_feature.is_some_and(|f| f >= n_features) {
            return Err(PipelineError::Explainability(
                "tree splits on a feature outside the transformed matrix".to_string(),
            ));
        }
        Ok(Self { model, n_features })
    }
}

impl Explainer for TreeExplainer<'_> {
    fn expected_value(&self) -> f64 {
        self.model.expected_value()
    }

    fn attributions(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_width(row, self.n_features)?;
        let mut phi = vec![0.0; self.n_features];
        for tree in self.model.trees() {
            tree_shap(tree, row, &mut phi);
        }
        check_finite(phi)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    /// None for the synthetic root element
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Accumulate one tree's Shapley values for `row` into `phi`
pub fn tree_shap(tree: &Tree, row: &[f64], phi: &mut [f64]) {
    recurse(tree, row, phi, 0, 0, &[], 1.0, 1.0, None);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    row: &[f64],
    phi: &mut [f64],
    node: usize,
    unique_depth: usize,
    parent_path: &[PathElement],
    parent_zero_fraction: f64,
    parent_one_fraction: f64,
    parent_feature: Option<usize>,
) {
    let mut path = Vec::with_capacity(unique_depth + 1);
    path.extend_from_slice(&parent_path[..unique_depth]);
    path.push(PathElement::default());
    extend_path(
        &mut path,
        unique_depth,
        parent_zero_fraction,
        parent_one_fraction,
        parent_feature,
    );

    let nodes = tree.nodes();
    match &nodes[node] {
        Node::Leaf { value, .. } => {
            for i in 1..=unique_depth {
                let weight = unwound_path_sum(&path, unique_depth, i);
                let element = path[i];
                if let Some(feature) = element.feature {
                    phi[feature] +=
                        weight * (element.one_fraction - element.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature,
            threshold,
            left,
            right,
            cover,
        } => {
            let (hot, cold) = if row[*feature] <= *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };
            let hot_zero_fraction = nodes[hot].cover() / cover;
            let cold_zero_fraction = nodes[cold].cover() / cover;
            let mut incoming_zero_fraction = 1.0;
            let mut incoming_one_fraction = 1.0;
            let mut depth = unique_depth;

            // A feature already on the path is unwound and re-entered
            if let Some(index) = path[..=depth]
                .iter()
                .position(|e| e.feature == Some(*feature))
            {
                incoming_zero_fraction = path[index].zero_fraction;
                incoming_one_fraction = path[index].one_fraction;
                unwind_path(&mut path, depth, index);
                depth -= 1;
            }

            recurse(
                tree,
                row,
                phi,
                hot,
                depth + 1,
                &path,
                hot_zero_fraction * incoming_zero_fraction,
                incoming_one_fraction,
                Some(*feature),
            );
            recurse(
                tree,
                row,
                phi,
                cold,
                depth + 1,
                &path,
                cold_zero_fraction * incoming_zero_fraction,
                0.0,
                Some(*feature),
            );
        }
    }
}

fn extend_path(
    path: &mut [PathElement],
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path[unique_depth] = PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    };
    let d = unique_depth as f64;
    for i in (0..unique_depth).rev() {
        let fi = i as f64;
        path[i + 1].pweight += one_fraction * path[i].pweight * (fi + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - fi) / (d + 1.0);
    }
}

fn unwind_path(path: &mut [PathElement], unique_depth: usize, path_index: usize) {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[unique_depth].pweight;
    let d = unique_depth as f64;

    for i in (0..unique_depth).rev() {
        let fi = i as f64;
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (d + 1.0) / ((fi + 1.0) * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (d - fi) / (d + 1.0);
        } else {
            path[i].pweight = path[i].pweight * (d + 1.0) / (zero_fraction * (d - fi));
        }
    }

    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[unique_depth].pweight;
    let d = unique_depth as f64;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..unique_depth).rev() {
            let fi = i as f64;
            let tmp = next_one_portion / ((fi + 1.0) * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (d - fi);
        }
    } else {
        for i in (0..unique_depth).rev() {
            total += path[i].pweight / (zero_fraction * (d - i as f64));
        }
    }
    total * (d + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinearConfig, TreeConfig};

    fn data() -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..120 {
            let a = (i % 12) as f64 / 11.0;
            let b = (i / 12) as f64 / 9.0;
            let c = ((i * 7) % 5) as f64;
            rows.push(vec![a, b, c]);
            labels.push(u8::from(a + 0.5 * b > 0.7 || (c > 3.0 && a > 0.3)));
        }
        (FeatureMatrix::from_rows(&rows), labels)
    }

    #[test]
    fn test_tree_attributions_are_additive() {
        let (x, y) = data();
        let mut model = BoostedTrees::new(TreeConfig {
            n_trees: 25,
            learning_rate: 0.2,
            max_depth: 4,
            ..TreeConfig::default()
        });
        model.fit(&x, &y).unwrap();
        let explainer = TreeExplainer::new(&model, 3).unwrap();

        for i in 0..x.rows() {
            let phi = explainer.attributions(x.row(i)).unwrap();
            let total = explainer.expected_value() + phi.iter().sum::<f64>();
            let margin = model.decision_function(x.row(i));
            assert!(
                (total - margin).abs() < 1e-6,
                "row {}: {} vs {}",
                i,
                total,
                margin
            );
        }
    }

    #[test]
    fn test_single_split_tree_matches_closed_form() {
        // One stump on feature 0: phi_0 = f(x) - E[f], others zero
        let x = FeatureMatrix::from_rows(&[vec![0.0, 5.0], vec![1.0, 5.0], vec![1.0, 5.0], vec![0.0, 5.0]]);
        let y = vec![0, 1, 1, 0];
        let mut model = BoostedTrees::new(TreeConfig {
            n_trees: 1,
            max_depth: 1,
            subsample: 1.0,
            colsample: 1.0,
            ..TreeConfig::default()
        });
        model.fit(&x, &y).unwrap();
        let explainer = TreeExplainer::new(&model, 2).unwrap();
        let phi = explainer.attributions(x.row(1)).unwrap();
        let expected = model.decision_function(x.row(1)) - model.expected_value();
        assert!((phi[0] - expected).abs() < 1e-12);
        assert_eq!(phi[1], 0.0);
    }

    #[test]
    fn test_unfitted_tree_model_rejected() {
        let model = BoostedTrees::new(TreeConfig::default());
        assert!(matches!(
            TreeExplainer::new(&model, 3),
            Err(PipelineError::Explainability(_))
        ));
    }

    #[test]
    fn test_linear_attributions_are_additive() {
        let (x, y) = data();
        let mut model = LogisticModel::new(LinearConfig::default());
        model.fit(&x, &y).unwrap();
        let explainer = LinearExplainer::new(&model, &x).unwrap();

        let row = x.row(17);
        let phi = explainer.attributions(row).unwrap();
        let total = explainer.expected_value() + phi.iter().sum::<f64>();
        assert!((total - model.decision_function(row)).abs() < 1e-9);
    }

    #[test]
    fn test_linear_attribution_zero_at_mean() {
        let (x, y) = data();
        let mut model = LogisticModel::new(LinearConfig::default());
        model.fit(&x, &y).unwrap();
        let explainer = LinearExplainer::new(&model, &x).unwrap();
        let phi = explainer.attributions(&x.column_means()).unwrap();
        assert!(phi.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_row_width_checked() {
        let (x, y) = data();
        let mut model = LogisticModel::new(LinearConfig::default());
        model.fit(&x, &y).unwrap();
        let explainer = LinearExplainer::new(&model, &x).unwrap();
        assert!(explainer.attributions(&[1.0]).is_err());
    }
}
