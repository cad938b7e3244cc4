//! Gradient-boosted decision trees for binary log-loss
//!
//! Second-order boosting with quantile-binned split search, Bernoulli row
//! subsampling and per-tree column subsampling. Every node records its cover
//! (training rows routed through it) so attributions can be computed exactly.

use super::features::FeatureMatrix;
use super::linear::sigmoid;
use crate::config::TreeConfig;
use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// One regression tree; the root is node 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.nodes[0].cover();
        if root_cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Leaf { value, cover } => Some(value * cover),
                Node::Split { .. } => None,
            })
            .sum::<f64>()
            / root_cover
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Quantile cut points per feature
#[derive(Debug, Clone)]
struct BinMapper {
    edges: Vec<Vec<f64>>,
}

impl BinMapper {
    fn fit(x: &FeatureMatrix, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, 255);
        let edges = (0..x.cols())
            .map(|j| {
                let mut values = x.column(j);
                values.sort_by(|a, b| a.total_cmp(b));
                let mut distinct = values.clone();
                distinct.dedup();
                if distinct.len() <= max_bins {
                    distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
                } else {
                    let n = values.len();
                    let mut cuts: Vec<f64> = (1..max_bins)
                        .map(|q| values[(q * n / max_bins).min(n - 1)])
                        .collect();
                    cuts.dedup();
                    // The largest value never needs a cut above it
                    if cuts.last().copied() == distinct.last().copied() {
                        cuts.pop();
                    }
                    cuts
                }
            })
            .collect();
        Self { edges }
    }

    fn bin(&self, feature: usize, value: f64) -> u8 {
        self.edges[feature].partition_point(|e| *e < value) as u8
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    /// Column-major binned copy of the matrix
    fn transform(&self, x: &FeatureMatrix) -> Vec<u8> {
        let n = x.rows();
        let mut binned = vec![0u8; n * x.cols()];
        for j in 0..x.cols() {
            for i in 0..n {
                binned[j * n + i] = self.bin(j, x.get(i, j));
            }
        }
        binned
    }
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Per-round training state shared by the recursive builder
struct Grower<'a> {
    config: &'a TreeConfig,
    mapper: &'a BinMapper,
    binned: &'a [u8],
    n_rows: usize,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
}

impl Grower<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.config.lambda).max(1e-12) * self.config.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.lambda).max(1e-12)
    }

    fn grow(&self, rows: Vec<usize>, depth: usize, nodes: &mut Vec<Node>) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let cover = rows.len() as f64;
        let index = nodes.len();

        let best = if depth < self.config.max_depth && rows.len() >= 2 {
            self.best_split(&rows, g, h)
        } else {
            None
        };

        let Some(best) = best else {
            nodes.push(Node::Leaf {
                value: self.leaf_weight(g, h),
                cover,
            });
            return index;
        };

        let column = &self.binned[best.feature * self.n_rows..(best.feature + 1) * self.n_rows];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| usize::from(column[i]) <= best.bin);

        // Placeholder, patched once both children exist
        nodes.push(Node::Leaf { value: 0.0, cover });
        let left = self.grow(left_rows, depth + 1, nodes);
        let right = self.grow(right_rows, depth + 1, nodes);
        nodes[index] = Node::Split {
            feature: best.feature,
            threshold: self.mapper.edges[best.feature][best.bin],
            left,
            right,
            cover,
        };
        index
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.features {
            let n_bins = self.mapper.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let column = &self.binned[feature * self.n_rows..(feature + 1) * self.n_rows];
            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            let mut hist_n = vec![0usize; n_bins];
            for &i in rows {
                let b = usize::from(column[i]);
                hist_g[b] += self.grad[i];
                hist_h[b] += self.hess[i];
                hist_n[b] += 1;
            }

            let (mut gl, mut hl, mut nl) = (0.0, 0.0, 0usize);
            for bin in 0..n_bins - 1 {
                gl += hist_g[bin];
                hl += hist_h[bin];
                nl += hist_n[bin];
                let nr = rows.len() - nl;
                if nl == 0 || nr == 0 {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.config.min_child_weight || hr < self.config.min_child_weight {
                    continue;
                }
                let gain = self.score(gl, hl) + self.score(gr, hr) - parent;
                let improves = match &best {
                    Some(current) => gain > current.gain + MIN_SPLIT_GAIN,
                    None => gain > MIN_SPLIT_GAIN,
                };
                if improves {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }
        best
    }
}

/// Boosted tree classifier producing log-odds margins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    config: TreeConfig,
    base_score: f64,
    trees: Vec<Tree>,
}

impl BoostedTrees {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            base_score: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Initial margin shared by every row
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[u8]) -> Result<()> {
        let n = x.rows();
        if n != y.len() {
            return Err(PipelineError::Data(format!(
                "feature rows ({}) and labels ({}) differ",
                n,
                y.len()
            )));
        }
        if n == 0 || x.cols() == 0 {
            return Err(PipelineError::Data(
                "cannot fit trees on an empty matrix".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mapper = BinMapper::fit(x, self.config.max_bins);
        let binned = mapper.transform(x);

        let positive_rate = (y.iter().filter(|&&v| v == 1).count() as f64 / n as f64)
            .clamp(1e-6, 1.0 - 1e-6);
        self.base_score = (positive_rate / (1.0 - positive_rate)).ln();
        self.trees.clear();

        let mut margins = vec![self.base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let n_features = x.cols();
        let n_sampled_features =
            ((self.config.colsample * n_features as f64).round() as usize).clamp(1, n_features);
        let mut all_features: Vec<usize> = (0..n_features).collect();

        for round in 0..self.config.n_trees {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - f64::from(y[i]);
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let mut rows: Vec<usize> = (0..n)
                .filter(|_| rng.random::<f64>() < self.config.subsample)
                .collect();
            if rows.is_empty() {
                rows = (0..n).collect();
            }

            all_features.shuffle(&mut rng);
            let mut features = all_features[..n_sampled_features].to_vec();
            features.sort_unstable();

            let grower = Grower {
                config: &self.config,
                mapper: &mapper,
                binned: &binned,
                n_rows: n,
                grad: &grad,
                hess: &hess,
                features: &features,
            };
            let mut nodes = Vec::new();
            grower.grow(rows, 0, &mut nodes);
            let tree = Tree { nodes };

            for (i, m) in margins.iter_mut().enumerate() {
                *m += tree.predict_row(x.row(i));
            }
            self.trees.push(tree);

            if round == 0 || (round + 1) % 100 == 0 {
                debug!("Boosting round {}/{}", round + 1, self.config.n_trees);
            }
        }

        Ok(())
    }

    /// Raw log-odds for one row
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    /// Expected margin under the training cover distribution
    pub fn expected_value(&self) -> f64 {
        self.base_score + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }

    pub fn predict_proba(&self, x: &FeatureMatrix) -> Vec<f64> {
        (0..x.rows())
            .map(|i| sigmoid(self.decision_function(x.row(i))))
            .collect()
    }
}
