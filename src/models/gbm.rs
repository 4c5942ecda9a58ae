//! Gradient-boosted decision trees for binary classification.
//!
//! Second-order boosting on the logistic loss with per-sample weights.
//! Features are quantized into at most `max_bins` bins per column before
//! training; split thresholds are the upper bounds of those bins, so a raw
//! value routes the same way at prediction time as its bin did in training.

use crate::dataset::LabeledDataset;
use crate::error::{FraudError, Result};
use crate::metrics::{log_loss, roc_auc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Maximum number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Shrinkage applied to every leaf
    pub learning_rate: f64,
    /// Fraction of rows sampled for each tree
    pub subsample: f64,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    /// Histogram bins per feature (at most 256)
    pub max_bins: usize,
    /// Stop after this many rounds without validation improvement
    pub early_stopping_rounds: Option<usize>,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            max_bins: 256,
            early_stopping_rounds: Some(20),
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be positive".into());
        }
        if self.max_depth == 0 {
            return Err("max_depth must be positive".into());
        }
        if !(self.learning_rate > 0.0) {
            return Err(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(format!("subsample must be in (0, 1], got {}", self.subsample));
        }
        if self.reg_lambda < 0.0 || self.min_child_weight < 0.0 {
            return Err("reg_lambda and min_child_weight must be non-negative".into());
        }
        if !(2..=256).contains(&self.max_bins) {
            return Err(format!("max_bins must be in 2..=256, got {}", self.max_bins));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Trained ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_margin: f64,
    n_features: usize,
    trees: Vec<Tree>,
    /// Total split gain per feature
    gain: Vec<f64>,
}

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Rounds actually run before stopping
    pub rounds_trained: usize,
    /// Zero-based round with the best validation score, if validated
    pub best_iteration: Option<usize>,
    pub best_validation_auc: Option<f64>,
    pub stopped_early: bool,
}

impl GradientBoostedTrees {
    /// Raw log-odds for one feature vector
    pub fn predict_margin(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.n_features {
            return Err(FraudError::SchemaMismatch {
                expected: format!("{} features", self.n_features),
                found: format!("{} features", x.len()),
            });
        }
        Ok(self.margin_unchecked(x))
    }

    /// Fraud-class probability for one feature vector
    pub fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        self.predict_margin(x).map(sigmoid)
    }

    fn margin_unchecked(&self, x: &[f64]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Check the ensemble is well formed before it is used for prediction.
    ///
    /// Children must come after their parent and inside the node list, so
    /// every traversal terminates within bounds.
    pub fn validate(&self) -> Result<()> {
        let corrupt =
            |msg: String| Err(FraudError::ModelUnavailable(format!("corrupt model: {}", msg)));

        if self.gain.len() != self.n_features {
            return corrupt(format!(
                "{} gain entries for {} features",
                self.gain.len(),
                self.n_features
            ));
        }
        if !self.base_margin.is_finite() {
            return corrupt("non-finite base margin".to_string());
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return corrupt(format!("tree {} has no nodes", t));
            }
            for (idx, node) in tree.nodes.iter().enumerate() {
                match *node {
                    Node::Leaf { value } if !value.is_finite() => {
                        return corrupt(format!("tree {} node {}: non-finite leaf", t, idx));
                    }
                    Node::Leaf { .. } => {}
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if feature >= self.n_features {
                            return corrupt(format!(
                                "tree {} node {}: feature {} out of range",
                                t, idx, feature
                            ));
                        }
                        if threshold.is_nan() {
                            return corrupt(format!("tree {} node {}: NaN threshold", t, idx));
                        }
                        for child in [left, right] {
                            if child <= idx || child >= tree.nodes.len() {
                                return corrupt(format!(
                                    "tree {} node {}: child {} out of order",
                                    t, idx, child
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Gain importance normalized to sum to 1, sorted descending
    pub fn feature_importance(&self, names: &[String]) -> Vec<(String, f64)> {
        let total: f64 = self.gain.iter().sum();
        let mut importance: Vec<(String, f64)> = names
            .iter()
            .zip(&self.gain)
            .map(|(name, &g)| (name.clone(), if total > 0.0 { g / total } else { 0.0 }))
            .collect();
        importance.sort_by(|a, b| b.1.total_cmp(&a.1));
        importance
    }

    /// Train on `train`, weighting positive samples by `positive_weight`.
    ///
    /// When `validation` is given, each round is scored on it and training
    /// stops after `early_stopping_rounds` rounds without improvement. A
    /// round improves on the best when its AUC is higher, or equal with a
    /// lower weighted log loss. The returned model keeps the trees up to
    /// and including the best round.
    pub fn fit(
        params: &BoosterParams,
        train: &LabeledDataset,
        positive_weight: f64,
        validation: Option<&LabeledDataset>,
        seed: u64,
    ) -> Result<(Self, FitReport)> {
        params.validate().map_err(FraudError::invalid_format)?;
        if train.is_empty() {
            return Err(FraudError::EmptyDataset);
        }
        let n_features = train.n_features();
        if let Some(valid) = validation {
            if valid.n_features() != n_features {
                return Err(FraudError::SchemaMismatch {
                    expected: format!("{} features", n_features),
                    found: format!("{} features", valid.n_features()),
                });
            }
        }

        let weight_of = |label: bool| if label { positive_weight } else { 1.0 };
        let weights: Vec<f64> = train.labels.iter().map(|&l| weight_of(l)).collect();
        let targets: Vec<f64> = train.labels.iter().map(|&l| f64::from(u8::from(l))).collect();

        let weight_sum: f64 = weights.iter().sum();
        let positive_mass: f64 = weights.iter().zip(&targets).map(|(w, y)| w * y).sum();
        let prior = (positive_mass / weight_sum).clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (prior / (1.0 - prior)).ln();

        let bins = BinnedMatrix::build(&train.features, n_features, params.max_bins);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut model = Self {
            base_margin,
            n_features,
            trees: Vec::with_capacity(params.n_estimators),
            gain: vec![0.0; n_features],
        };

        let mut train_margin = vec![base_margin; train.len()];
        let mut grad = vec![0.0; train.len()];
        let mut hess = vec![0.0; train.len()];

        let valid_weights: Vec<f64> = validation
            .map(|v| v.labels.iter().map(|&l| weight_of(l)).collect())
            .unwrap_or_default();
        let mut valid_margin = vec![base_margin; validation.map_or(0, LabeledDataset::len)];
        let mut valid_prob = vec![0.0; valid_margin.len()];

        let mut round_gains: Vec<Vec<f64>> = Vec::with_capacity(params.n_estimators);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut since_best = 0usize;
        let mut stopped_early = false;
        let mut warned_undefined_auc = false;

        for round in 0..params.n_estimators {
            for i in 0..train.len() {
                let p = sigmoid(train_margin[i]);
                grad[i] = weights[i] * (p - targets[i]);
                hess[i] = weights[i] * p * (1.0 - p);
            }

            let mut rows: Vec<u32> = if params.subsample < 1.0 {
                (0..train.len() as u32)
                    .filter(|_| rng.gen::<f64>() < params.subsample)
                    .collect()
            } else {
                Vec::new()
            };
            if rows.is_empty() {
                rows = (0..train.len() as u32).collect();
            }

            let mut builder = TreeBuilder {
                params,
                bins: &bins,
                grad: &grad,
                hess: &hess,
                nodes: Vec::new(),
                gain: vec![0.0; n_features],
            };
            builder.grow(&mut rows, 0);
            round_gains.push(builder.gain);
            let tree = Tree {
                nodes: builder.nodes,
            };

            for (i, row) in train.features.iter().enumerate() {
                train_margin[i] += tree.predict(row);
            }
            model.trees.push(tree);

            let Some(valid) = validation else {
                continue;
            };
            let tree = &model.trees[round];
            for (i, row) in valid.features.iter().enumerate() {
                valid_margin[i] += tree.predict(row);
                valid_prob[i] = sigmoid(valid_margin[i]);
            }

            let Some(auc) = roc_auc(&valid.labels, &valid_margin) else {
                if !warned_undefined_auc {
                    warn!("Validation set lacks one class, early stopping disabled");
                    warned_undefined_auc = true;
                }
                continue;
            };
            let loss = log_loss(&valid.labels, &valid_prob, Some(&valid_weights));

            let improved = match best {
                None => true,
                Some((_, best_auc, best_loss)) => {
                    auc > best_auc + 1e-12
                        || ((auc - best_auc).abs() <= 1e-12 && loss < best_loss - 1e-12)
                }
            };
            if improved {
                best = Some((round, auc, loss));
                since_best = 0;
            } else {
                since_best += 1;
            }

            if round % 10 == 0 {
                debug!(round = round, valid_auc = auc, valid_logloss = loss, "Boosting round");
            }

            if let Some(patience) = params.early_stopping_rounds {
                if since_best >= patience {
                    stopped_early = true;
                    break;
                }
            }
        }

        let rounds_trained = model.trees.len();
        if let Some((best_round, auc, _)) = best {
            model.trees.truncate(best_round + 1);
            round_gains.truncate(best_round + 1);
            info!(
                rounds = rounds_trained,
                best_iteration = best_round,
                best_auc = auc,
                stopped_early = stopped_early,
                "Boosting finished"
            );
        } else {
            info!(rounds = rounds_trained, "Boosting finished without validation");
        }

        for gains in &round_gains {
            for (total, g) in model.gain.iter_mut().zip(gains) {
                *total += g;
            }
        }

        let report = FitReport {
            rounds_trained,
            best_iteration: best.map(|(r, _, _)| r),
            best_validation_auc: best.map(|(_, a, _)| a),
            stopped_early,
        };
        Ok((model, report))
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Column-major bin indices plus per-feature bin upper bounds
struct BinnedMatrix {
    columns: Vec<Vec<u8>>,
    upper_bounds: Vec<Vec<f64>>,
}

impl BinnedMatrix {
    fn build(features: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let mut columns = Vec::with_capacity(n_features);
        let mut upper_bounds = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let mut values: Vec<f64> = features.iter().map(|row| row[f]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();

            let bounds: Vec<f64> = if values.len() <= max_bins {
                values
            } else {
                let mut bounds: Vec<f64> = (1..=max_bins)
                    .map(|k| values[k * values.len() / max_bins - 1])
                    .collect();
                bounds.dedup();
                bounds
            };

            let column = features
                .iter()
                .map(|row| {
                    let b = bounds.partition_point(|&u| u < row[f]);
                    b.min(bounds.len() - 1) as u8
                })
                .collect();

            columns.push(column);
            upper_bounds.push(bounds);
        }

        Self {
            columns,
            upper_bounds,
        }
    }
}

struct TreeBuilder<'a> {
    params: &'a BoosterParams,
    bins: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<Node>,
    gain: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: &mut [u32], depth: usize) -> usize {
        let (g_sum, h_sum) = rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.grad[r as usize], h + self.hess[r as usize])
        });

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g_sum, h_sum),
        });

        if depth >= self.params.max_depth || h_sum < 2.0 * self.params.min_child_weight {
            return idx;
        }

        let Some(best) = self.find_split(rows, g_sum, h_sum) else {
            return idx;
        };

        let bins = self.bins;
        let column = &bins.columns[best.feature];
        let split_at = partition(rows, |r| column[r as usize] as usize <= best.bin);
        let (left_rows, right_rows) = rows.split_at_mut(split_at);

        self.gain[best.feature] += best.gain;
        let threshold = bins.upper_bounds[best.feature][best.bin];
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold,
            left,
            right,
        };
        idx
    }

    fn find_split(&self, rows: &[u32], g_sum: f64, h_sum: f64) -> Option<BestSplit> {
        let parent = self.score(g_sum, h_sum);
        let mcw = self.params.min_child_weight;
        let mut best: Option<BestSplit> = None;

        for (feature, column) in self.bins.columns.iter().enumerate() {
            let n_bins = self.bins.upper_bounds[feature].len();
            if n_bins < 2 {
                continue;
            }

            let mut hist = vec![(0.0f64, 0.0f64); n_bins];
            for &r in rows {
                let slot = &mut hist[column[r as usize] as usize];
                slot.0 += self.grad[r as usize];
                slot.1 += self.hess[r as usize];
            }

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for (bin, &(g, h)) in hist.iter().enumerate().take(n_bins - 1) {
                g_left += g;
                h_left += h;
                let g_right = g_sum - g_left;
                let h_right = h_sum - h_left;
                if h_left < mcw || h_right < mcw {
                    continue;
                }

                let gain = self.score(g_left, h_left) + self.score(g_right, h_right) - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature, bin, gain });
                }
            }
        }

        best
    }
}

/// In-place partition; rows matching `pred` move to the front. Returns their count.
fn partition(rows: &mut [u32], pred: impl Fn(u32) -> bool) -> usize {
    let mut next = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(i, next);
            next += 1;
        }
    }
    next
}
