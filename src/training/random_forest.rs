//! Random Forest classifier

use crate::error::{ExseekError, Result};
use super::decision_tree::DecisionTree;
use super::models::{
    check_fit_input, Capabilities, Estimator, ImportanceMethod, ParamValue, ScoreMethod,
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random state
    pub random_state: u64,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            bootstrap: true,
            random_state: 42,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn compute_feature_importances(&mut self) {
        let mut total_importances = Array1::<f64>::zeros(self.n_features);
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            total_importances += imp;
        }

        let total = total_importances.sum();
        if total > 0.0 {
            total_importances /= total;
        }
        self.feature_importances = Some(total_importances);
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            score: Some(ScoreMethod::PredictProba),
            importance: Some(ImportanceMethod::FeatureImportances),
        }
    }

    /// Fit the forest; bootstrap draws become per-sample multiplicities on the weights
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y, sample_weight)?;
        if self.n_estimators == 0 {
            return Err(ExseekError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "a forest needs at least one tree".to_string(),
            });
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = ((n_features as f64).sqrt().ceil() as usize).max(1);
        self.n_features = n_features;

        // Build trees in parallel
        let base_seed = self.random_state;
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut weights = if self.bootstrap {
                    let mut counts = Array1::<f64>::zeros(n_samples);
                    for _ in 0..n_samples {
                        counts[rng.gen_range(0..n_samples)] += 1.0;
                    }
                    counts * sample_weight
                } else {
                    sample_weight.clone()
                };
                // A degenerate draw (every selected sample weighted zero) falls back to all samples
                if weights.sum() <= 0.0 {
                    weights = sample_weight.clone();
                }

                let mut tree = DecisionTree::new()
                    .with_max_depth(self.max_depth)
                    .with_max_features(max_features)
                    .with_random_state(rng.gen());
                tree.fit(x, y, &weights)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Mean positive-class leaf probability over all trees
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ExseekError::ModelNotFitted);
        }

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<_>>()?;

        let mut proba = Array1::<f64>::zeros(x.nrows());
        for preds in &all_predictions {
            proba += preds;
        }
        Ok(proba / all_predictions.len() as f64)
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        self.feature_importances.clone().ok_or(ExseekError::ModelNotFitted)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => {
                self.n_estimators = value.as_usize();
                Ok(())
            }
            "max_depth" => {
                self.max_depth = Some(value.as_usize());
                Ok(())
            }
            _ => Err(ExseekError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: "not a random_forest parameter".to_string(),
            }),
        }
    }

    fn params(&self) -> Vec<(String, ParamValue)> {
        let mut params = vec![("n_estimators".to_string(), ParamValue::Int(self.n_estimators))];
        if let Some(depth) = self.max_depth {
            params.push(("max_depth".to_string(), ParamValue::Int(depth)));
        }
        params
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}
