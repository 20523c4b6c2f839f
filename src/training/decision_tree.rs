//! Weighted binary classification tree (Gini impurity)
//!
//! Leaves store the weighted fraction of positive samples, so a forest
//! can average them into a probability score.

use crate::error::{ExseekError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with positive-class probability
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Weighted class totals of a node
#[derive(Debug, Clone, Copy, Default)]
struct ClassWeights {
    pos: f64,
    neg: f64,
}

impl ClassWeights {
    fn total(&self) -> f64 {
        self.pos + self.neg
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p = self.pos / total;
        2.0 * p * (1.0 - p)
    }

    fn add(&mut self, label: f64, weight: f64) {
        if label > 0.5 {
            self.pos += weight;
        } else {
            self.neg += weight;
        }
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at random for each split
    pub max_features: Option<usize>,
    /// Seed for the per-split feature draws
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the tree; samples with zero weight never influence a split
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() || n_samples != sample_weight.len() {
            return Err(ExseekError::ShapeError {
                expected: format!("y and sample_weight length = {}", n_samples),
                actual: format!("y = {}, sample_weight = {}", y.len(), sample_weight.len()),
            });
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        let indices: Vec<usize> = (0..n_samples).filter(|&i| sample_weight[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(ExseekError::FitError("all sample weights are zero".to_string()));
        }
        let root = self.build_tree(x, y, sample_weight, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn node_weights(y: &Array1<f64>, w: &Array1<f64>, indices: &[usize]) -> ClassWeights {
        let mut cw = ClassWeights::default();
        for &i in indices {
            cw.add(y[i], w[i]);
        }
        cw
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        w: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let parent = Self::node_weights(y, w, indices);
        let leaf = TreeNode::Leaf {
            value: if parent.total() > 0.0 { parent.pos / parent.total() } else { 0.0 },
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || parent.pos == 0.0
            || parent.neg == 0.0;
        if should_stop {
            return leaf;
        }

        let best = self.find_best_split(x, y, w, indices, parent, rng);
        let Some((feature, threshold, gain)) = best else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        importances[feature] += gain;

        let left = Box::new(self.build_tree(x, y, w, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, w, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best `(feature, threshold, weighted impurity decrease)` among a random feature subset
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        w: &Array1<f64>,
        indices: &[usize],
        parent: ClassWeights,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, f64)> {
        let n_features = x.ncols();
        let n_try = self.max_features.unwrap_or(n_features).clamp(1, n_features);
        let candidates: Vec<usize> = if n_try == n_features {
            (0..n_features).collect()
        } else {
            sample(rng, n_features, n_try).into_vec()
        };

        let parent_impurity = parent.gini();
        let parent_total = parent.total();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in candidates {
            let mut order: Vec<usize> = indices.to_vec();
            order.sort_by(|&a, &b| {
                x[[a, feature]]
                    .partial_cmp(&x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left = ClassWeights::default();
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(y[i], w[i]);

                let value = x[[i, feature]];
                let next = x[[order[pos + 1], feature]];
                if next <= value {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < self.min_samples_leaf || order.len() - n_left < self.min_samples_leaf {
                    continue;
                }

                let right = ClassWeights {
                    pos: parent.pos - left.pos,
                    neg: parent.neg - left.neg,
                };
                let child_impurity =
                    (left.total() * left.gini() + right.total() * right.gini()) / parent_total;
                let gain = parent_total * (parent_impurity - child_impurity);

                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (value + next) / 2.0, gain));
                }
            }
        }

        best
    }

    /// Positive-class probability per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ExseekError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(ExseekError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| Self::predict_sample(root, row)).collect())
    }

    fn predict_sample(node: &TreeNode, sample: ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    /// Normalized impurity-decrease importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, &Array1::ones(4)).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba, array![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new().with_max_depth(Some(1));
        tree.fit(&x, &y, &Array1::ones(4)).unwrap();
        assert!(tree.get_depth() <= 1);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, &Array1::ones(4)).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_zero_weight_samples_are_ignored() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let w = array![1.0, 0.0, 1.0, 0.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, &w).unwrap();
        let proba = tree.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|&p| p == 0.0));
    }
}
