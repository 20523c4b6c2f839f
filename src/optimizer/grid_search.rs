//! Exhaustive grid search with inner stratified cross-validation

use crate::error::{ExseekError, Result};
use crate::training::{Estimator, ParamValue, SplitPlanner, SplitStrategy};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// One hyperparameter assignment
pub type TrialParams = Vec<(String, ParamValue)>;

/// Result of a single grid candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    /// Mean inner-fold score
    pub value: f64,
    pub fold_scores: Vec<f64>,
    pub duration_secs: f64,
}

/// All candidates evaluated on one training partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
}

impl Study {
    pub fn new() -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
        }
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    /// Add a trial result; the earliest trial wins ties
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        let is_better = match self.best_trial_idx {
            None => !result.value.is_nan(),
            Some(best_idx) => result.value > self.trials[best_idx].value,
        };
        if is_better {
            self.best_trial_idx = Some(idx);
        }
        self.trials.push(result);
    }
}

impl Default for Study {
    fn default() -> Self {
        Self::new()
    }
}

/// Grid search over a method's parameter grid.
///
/// Each candidate is scored by the estimator's default score (accuracy) averaged
/// over stratified inner folds of the training partition. The winning
/// configuration is returned unfitted.
#[derive(Debug, Clone)]
pub struct HyperparameterTuner {
    param_grid: Vec<(String, Vec<ParamValue>)>,
    n_folds: usize,
    parallel: bool,
}

impl HyperparameterTuner {
    pub fn new(param_grid: Vec<(String, Vec<ParamValue>)>) -> Self {
        Self {
            param_grid,
            n_folds: 5,
            parallel: false,
        }
    }

    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    /// Evaluate candidates concurrently
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Cartesian product of the grid, first parameter varying slowest
    pub fn candidates(&self) -> Vec<TrialParams> {
        let mut out: Vec<TrialParams> = vec![Vec::new()];
        for (name, values) in &self.param_grid {
            out = out
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut params = prefix.clone();
                        params.push((name.clone(), v.clone()));
                        params
                    })
                })
                .collect();
        }
        out
    }

    /// Pick the best configuration of `base` on `(x, y)`
    pub fn tune(
        &self,
        base: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
    ) -> Result<(Box<dyn Estimator>, Study)> {
        let start = Instant::now();
        let n_pos = y.iter().filter(|&&v| v > 0.5).count();
        let min_class = n_pos.min(y.len() - n_pos);
        let n_folds = self.n_folds.min(min_class);
        if n_folds < 2 {
            return Err(ExseekError::DataError(format!(
                "grid search needs at least 2 samples of each class, the smallest class has {}",
                min_class
            )));
        }

        let mut inner = SplitPlanner::new(SplitStrategy::StratifiedKFold)
            .with_n_splits(n_folds)
            .plan(y)?;
        inner.pop();

        let candidates = self.candidates();
        let evaluate = |(trial_id, params): (usize, &TrialParams)| -> Result<TrialResult> {
            let trial_start = Instant::now();
            let mut fold_scores = Vec::with_capacity(inner.len());
            for fold in &inner {
                let mut est = base.clone_box();
                for (name, value) in params {
                    est.set_param(name, value)?;
                }
                let x_train = x.select(Axis(0), &fold.train_indices);
                let y_train = y.select(Axis(0), &fold.train_indices);
                let w_train = sample_weight.select(Axis(0), &fold.train_indices);
                est.fit(&x_train, &y_train, &w_train)?;

                let x_test = x.select(Axis(0), &fold.test_indices);
                let y_test = y.select(Axis(0), &fold.test_indices);
                fold_scores.push(est.score(&x_test, &y_test)?);
            }
            let value = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            Ok(TrialResult {
                trial_id,
                params: params.clone(),
                value,
                fold_scores,
                duration_secs: trial_start.elapsed().as_secs_f64(),
            })
        };

        let results: Vec<TrialResult> = if self.parallel {
            candidates.par_iter().enumerate().map(evaluate).collect::<Result<_>>()?
        } else {
            candidates.iter().enumerate().map(evaluate).collect::<Result<_>>()?
        };

        let mut study = Study::new();
        for result in results {
            study.add_trial(result);
        }
        study.total_duration_secs = start.elapsed().as_secs_f64();

        let mut best = base.clone_box();
        if let Some(trial) = study.best_trial() {
            for (name, value) in &trial.params {
                best.set_param(name, value)?;
            }
            debug!(
                estimator = best.name(),
                params = ?trial.params,
                score = trial.value,
                "grid search finished"
            );
        }
        Ok((best, study))
    }
}
