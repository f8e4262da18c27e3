//! In-process candidate regressors for the ensemble trainer.
//!
//! Three algorithm families compete per prediction target: a bagged forest
//! of regression trees, gradient-boosted shallow trees, and a single
//! hidden-layer feed-forward network. Tree-based models expose per-feature
//! importance (total squared-error reduction attributed to splits).

use anyhow::{bail, ensure};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmId {
    RandomForest,
    GradientBoosting,
    NeuralNetwork,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 3] = [
        AlgorithmId::RandomForest,
        AlgorithmId::GradientBoosting,
        AlgorithmId::NeuralNetwork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmId::RandomForest => "random_forest",
            AlgorithmId::GradientBoosting => "gradient_boosting",
            AlgorithmId::NeuralNetwork => "neural_network",
        }
    }
}

/// One node of a regression tree. `feature == -1` marks a leaf; leaves carry
/// the mean target of their training partition in `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    feature: i32,
    threshold: f64,
    left: i32,
    right: i32,
    value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

struct TreeParams {
    max_depth: usize,
    min_samples_split: usize,
    /// Number of features considered per split; None means all.
    max_features: Option<usize>,
}

impl RegressionTree {
    fn fit(
        xs: &[Vec<f64>],
        ys: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> anyhow::Result<Self> {
        ensure!(!indices.is_empty(), "cannot fit a tree on zero samples");
        let n_features = xs[0].len();
        let mut tree = Self {
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        tree.build(xs, ys, indices.to_vec(), 0, params, rng);
        Ok(tree)
    }

    fn build(
        &mut self,
        xs: &[Vec<f64>],
        ys: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> i32 {
        let mean = indices.iter().map(|i| ys[*i]).sum::<f64>() / indices.len() as f64;

        let at_limit = depth >= params.max_depth || indices.len() < params.min_samples_split;
        let split = if at_limit {
            None
        } else {
            self.best_split(xs, ys, &indices, params, rng)
        };

        let Some((feature, threshold, gain)) = split else {
            return self.push_leaf(mean);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|i| xs[**i][feature] <= threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return self.push_leaf(mean);
        }

        self.importances[feature] += gain;

        let node_idx = self.nodes.len() as i32;
        self.nodes.push(TreeNode {
            feature: feature as i32,
            threshold,
            left: -1,
            right: -1,
            value: mean,
        });

        let left = self.build(xs, ys, left_idx, depth + 1, params, rng);
        let right = self.build(xs, ys, right_idx, depth + 1, params, rng);
        self.nodes[node_idx as usize].left = left;
        self.nodes[node_idx as usize].right = right;
        node_idx
    }

    fn push_leaf(&mut self, value: f64) -> i32 {
        let idx = self.nodes.len() as i32;
        self.nodes.push(TreeNode {
            feature: -1,
            threshold: 0.0,
            left: -1,
            right: -1,
            value,
        });
        idx
    }

    /// Best split by squared-error reduction, scanning midpoints between
    /// consecutive distinct values of each candidate feature.
    fn best_split(
        &self,
        xs: &[Vec<f64>],
        ys: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Option<(usize, f64, f64)> {
        let n_features = xs[0].len();
        let candidates: Vec<usize> = match params.max_features {
            Some(k) if k < n_features => {
                let mut all: Vec<usize> = (0..n_features).collect();
                all.shuffle(rng);
                all.truncate(k);
                all
            }
            _ => (0..n_features).collect(),
        };

        let n = indices.len() as f64;
        let total: f64 = indices.iter().map(|i| ys[*i]).sum();
        let total_sq: f64 = indices.iter().map(|i| ys[*i] * ys[*i]).sum();
        let parent_sse = total_sq - total * total / n;

        let mut best: Option<(usize, f64, f64)> = None;

        for feature in candidates {
            let mut order: Vec<usize> = indices.to_vec();
            order.sort_by(|a, b| xs[*a][feature].total_cmp(&xs[*b][feature]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for (pos, i) in order.iter().enumerate().take(order.len() - 1) {
                let y = ys[*i];
                left_sum += y;
                left_sq += y * y;

                let here = xs[*i][feature];
                let next = xs[order[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let nl = (pos + 1) as f64;
                let nr = n - nl;
                let left_sse = left_sq - left_sum * left_sum / nl;
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let right_sse = right_sq - right_sum * right_sum / nr;

                let gain = parent_sse - left_sse - right_sse;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.feature < 0 {
                return node.value;
            }
            let v = x.get(node.feature as usize).copied().unwrap_or(0.0);
            // NaN goes left, matching the split side of missing data.
            idx = if v.is_nan() || v <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

/// Bagged ensemble of regression trees with per-split feature subsampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestRegressor {
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

const FOREST_TREES: usize = 50;
const FOREST_MAX_DEPTH: usize = 10;

impl ForestRegressor {
    pub fn fit(xs: &[Vec<f64>], ys: &[f64], seed: u64) -> anyhow::Result<Self> {
        ensure!(xs.len() == ys.len() && !xs.is_empty(), "invalid training batch");
        let n = xs.len();
        let n_features = xs[0].len();
        let max_features = (n_features as f64).sqrt().ceil() as usize;
        let params = TreeParams {
            max_depth: FOREST_MAX_DEPTH,
            min_samples_split: 4,
            max_features: Some(max_features.max(1)),
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(FOREST_TREES);
        for _ in 0..FOREST_TREES {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(RegressionTree::fit(xs, ys, &sample, &params, &mut rng)?);
        }

        let importances = normalized_importances(&trees, n_features);
        Ok(Self { trees, importances })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }
}

/// Gradient-boosted shallow trees on squared-error residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedRegressor {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

const BOOST_ROUNDS: usize = 60;
const BOOST_MAX_DEPTH: usize = 3;
const BOOST_LEARNING_RATE: f64 = 0.1;

impl BoostedRegressor {
    pub fn fit(xs: &[Vec<f64>], ys: &[f64], seed: u64) -> anyhow::Result<Self> {
        ensure!(xs.len() == ys.len() && !xs.is_empty(), "invalid training batch");
        let n = xs.len();
        let n_features = xs[0].len();
        let params = TreeParams {
            max_depth: BOOST_MAX_DEPTH,
            min_samples_split: 4,
            max_features: None,
        };

        let init = ys.iter().sum::<f64>() / n as f64;
        let mut residuals: Vec<f64> = ys.iter().map(|y| y - init).collect();
        let indices: Vec<usize> = (0..n).collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(BOOST_ROUNDS);
        for _ in 0..BOOST_ROUNDS {
            let tree = RegressionTree::fit(xs, &residuals, &indices, &params, &mut rng)?;
            for (i, r) in residuals.iter_mut().enumerate() {
                *r -= BOOST_LEARNING_RATE * tree.predict(&xs[i]);
            }
            trees.push(tree);
        }

        let importances = normalized_importances(&trees, n_features);
        Ok(Self {
            init,
            learning_rate: BOOST_LEARNING_RATE,
            trees,
            importances,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }
}

fn normalized_importances(trees: &[RegressionTree], n_features: usize) -> Vec<f64> {
    let mut sums = vec![0.0; n_features];
    for tree in trees {
        for (j, imp) in tree.importances.iter().enumerate() {
            sums[j] += imp;
        }
    }
    let total: f64 = sums.iter().sum();
    if total > 0.0 {
        for s in &mut sums {
            *s /= total;
        }
    }
    sums
}

/// Single hidden-layer feed-forward regressor trained with plain SGD.
/// Targets are standardized internally so the same hyperparameters work for
/// probabilities and 0-100 scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpRegressor {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
    y_mean: f64,
    y_std: f64,
}

const MLP_HIDDEN: usize = 32;
const MLP_EPOCHS: usize = 200;
const MLP_LEARNING_RATE: f64 = 0.01;

impl MlpRegressor {
    pub fn fit(xs: &[Vec<f64>], ys: &[f64], seed: u64) -> anyhow::Result<Self> {
        ensure!(xs.len() == ys.len() && !xs.is_empty(), "invalid training batch");
        let n = xs.len();
        let n_features = xs[0].len();

        let y_mean = ys.iter().sum::<f64>() / n as f64;
        let y_var = ys.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if y_var > 0.0 { y_var.sqrt() } else { 1.0 };
        let targets: Vec<f64> = ys.iter().map(|y| (y - y_mean) / y_std).collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let limit = (6.0 / (n_features + MLP_HIDDEN) as f64).sqrt();
        let mut w1: Vec<Vec<f64>> = (0..MLP_HIDDEN)
            .map(|_| (0..n_features).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();
        let mut b1 = vec![0.0; MLP_HIDDEN];
        let mut w2: Vec<f64> = (0..MLP_HIDDEN).map(|_| rng.gen_range(-limit..limit)).collect();
        let mut b2 = 0.0;

        let mut order: Vec<usize> = (0..n).collect();

        for _ in 0..MLP_EPOCHS {
            order.shuffle(&mut rng);
            for &i in &order {
                let x = &xs[i];

                // Forward pass, ReLU hidden layer.
                let mut hidden = vec![0.0; MLP_HIDDEN];
                for (h, (wrow, b)) in hidden.iter_mut().zip(w1.iter().zip(b1.iter())) {
                    let z: f64 = wrow.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + b;
                    *h = z.max(0.0);
                }
                let out: f64 =
                    w2.iter().zip(hidden.iter()).map(|(w, h)| w * h).sum::<f64>() + b2;

                let err = out - targets[i];
                if !err.is_finite() {
                    bail!("mlp training diverged (non-finite loss)");
                }

                // Backward pass.
                for j in 0..MLP_HIDDEN {
                    let grad_h = if hidden[j] > 0.0 { err * w2[j] } else { 0.0 };
                    w2[j] -= MLP_LEARNING_RATE * err * hidden[j];
                    if grad_h != 0.0 {
                        for (w, v) in w1[j].iter_mut().zip(x.iter()) {
                            *w -= MLP_LEARNING_RATE * grad_h * v;
                        }
                        b1[j] -= MLP_LEARNING_RATE * grad_h;
                    }
                }
                b2 -= MLP_LEARNING_RATE * err;
            }
        }

        Ok(Self {
            w1,
            b1,
            w2,
            b2,
            y_mean,
            y_std,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut out = self.b2;
        for ((wrow, b), w_out) in self.w1.iter().zip(self.b1.iter()).zip(self.w2.iter()) {
            let z: f64 = wrow.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + b;
            out += w_out * z.max(0.0);
        }
        out * self.y_std + self.y_mean
    }
}

/// A trained model of any candidate family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest(ForestRegressor),
    GradientBoosting(BoostedRegressor),
    NeuralNetwork(MlpRegressor),
}

impl Regressor {
    pub fn algorithm(&self) -> AlgorithmId {
        match self {
            Regressor::RandomForest(_) => AlgorithmId::RandomForest,
            Regressor::GradientBoosting(_) => AlgorithmId::GradientBoosting,
            Regressor::NeuralNetwork(_) => AlgorithmId::NeuralNetwork,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Regressor::RandomForest(m) => m.predict(x),
            Regressor::GradientBoosting(m) => m.predict(x),
            Regressor::NeuralNetwork(m) => m.predict(x),
        }
    }

    /// Normalized per-feature importance; only tree-based models report it.
    pub fn feature_importances(&self) -> Option<&[f64]> {
        match self {
            Regressor::RandomForest(m) => Some(&m.importances),
            Regressor::GradientBoosting(m) => Some(&m.importances),
            Regressor::NeuralNetwork(_) => None,
        }
    }
}

/// Fit one candidate algorithm on a (scaled) batch.
pub fn fit_candidate(
    algorithm: AlgorithmId,
    xs: &[Vec<f64>],
    ys: &[f64],
    seed: u64,
) -> anyhow::Result<Regressor> {
    match algorithm {
        AlgorithmId::RandomForest => Ok(Regressor::RandomForest(ForestRegressor::fit(xs, ys, seed)?)),
        AlgorithmId::GradientBoosting => {
            Ok(Regressor::GradientBoosting(BoostedRegressor::fit(xs, ys, seed)?))
        }
        AlgorithmId::NeuralNetwork => Ok(Regressor::NeuralNetwork(MlpRegressor::fit(xs, ys, seed)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 2*x0 with a little structure on x1.
    fn linear_batch(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let xs: Vec<Vec<f64>> = (0..n)
            .map(|_| vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
            .collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x[0]).collect();
        (xs, ys)
    }

    #[test]
    fn tree_splits_on_informative_feature() {
        let (xs, ys) = linear_batch(200);
        let indices: Vec<usize> = (0..xs.len()).collect();
        let params = TreeParams {
            max_depth: 6,
            min_samples_split: 4,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let tree = RegressionTree::fit(&xs, &ys, &indices, &params, &mut rng).unwrap();
        assert!(tree.importances[0] > tree.importances[1]);

        let pred = tree.predict(&[0.8, 0.0]);
        assert!((pred - 1.6).abs() < 0.5);
    }

    #[test]
    fn forest_learns_monotone_relation() {
        let (xs, ys) = linear_batch(300);
        let forest = ForestRegressor::fit(&xs, &ys, 42).unwrap();
        assert!(forest.predict(&[0.9, 0.0]) > forest.predict(&[-0.9, 0.0]));
    }

    #[test]
    fn boosted_fits_tighter_than_initial_mean() {
        let (xs, ys) = linear_batch(300);
        let model = BoostedRegressor::fit(&xs, &ys, 42).unwrap();
        let sse_model: f64 = xs
            .iter()
            .zip(ys.iter())
            .map(|(x, y)| (model.predict(x) - y).powi(2))
            .sum();
        let mean = ys.iter().sum::<f64>() / ys.len() as f64;
        let sse_mean: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
        assert!(sse_model < sse_mean * 0.5);
    }

    #[test]
    fn mlp_recovers_target_scale() {
        let (xs, ys) = linear_batch(300);
        // Shift targets to a 0-100 style scale.
        let ys: Vec<f64> = ys.iter().map(|y| 50.0 + 20.0 * y).collect();
        let model = MlpRegressor::fit(&xs, &ys, 42).unwrap();
        let pred = model.predict(&[0.0, 0.0]);
        assert!((pred - 50.0).abs() < 15.0);
    }

    #[test]
    fn predictions_are_deterministic_for_fixed_seed() {
        let (xs, ys) = linear_batch(100);
        let a = ForestRegressor::fit(&xs, &ys, 9).unwrap();
        let b = ForestRegressor::fit(&xs, &ys, 9).unwrap();
        assert_eq!(a.predict(&[0.3, 0.1]), b.predict(&[0.3, 0.1]));
    }

    #[test]
    fn forest_importances_are_normalized() {
        let (xs, ys) = linear_batch(200);
        let forest = ForestRegressor::fit(&xs, &ys, 3).unwrap();
        let regressor = Regressor::RandomForest(forest);
        let imp = regressor.feature_importances().unwrap();
        let sum: f64 = imp.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mlp_reports_no_importances() {
        let (xs, ys) = linear_batch(50);
        let model = Regressor::NeuralNetwork(MlpRegressor::fit(&xs, &ys, 1).unwrap());
        assert!(model.feature_importances().is_none());
    }
}
