//! Per-fold tuning, selection, refit and scoring

use crate::error::Result;
use crate::optimizer::HyperparameterTuner;
use crate::selection::{FeatureSelector, RfeTrace, StepScore};
use crate::training::{
    compute_sample_weight, feature_importances, positive_scores, Estimator, Fold, Method, Metric,
};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, info};

/// Everything one fold contributes to the result bundle
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub fold_idx: usize,
    pub is_pseudo: bool,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    /// Positive-class score for every sample
    pub predictions: Array1<f64>,
    pub predicted_labels: Array1<f64>,
    pub selected_features: Vec<usize>,
    /// Importances of the refit estimator, aligned to `selected_features`
    pub importances: Array1<f64>,
    pub estimator: Box<dyn Estimator>,
    /// `None` for the pseudo-fold
    pub train_score: Option<f64>,
    /// `None` for the pseudo-fold and leave-one-out folds
    pub test_score: Option<f64>,
    pub rfe: Option<RfeTrace>,
}

/// Runs one fold against the shared, read-only matrix and labels
pub struct FoldEvaluator<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    method: Method,
    estimator: Option<Box<dyn Estimator>>,
    tuner: Option<HyperparameterTuner>,
    selector: Option<FeatureSelector>,
    metric: &'a dyn Metric,
    balanced_weights: bool,
    leave_one_out: bool,
    random_state: u64,
}

impl<'a> FoldEvaluator<'a> {
    pub fn new(
        x: &'a Array2<f64>,
        y: &'a Array1<f64>,
        method: Method,
        metric: &'a dyn Metric,
    ) -> Self {
        Self {
            x,
            y,
            method,
            estimator: None,
            tuner: None,
            selector: None,
            metric,
            balanced_weights: false,
            leave_one_out: false,
            random_state: 0,
        }
    }

    /// Start every fold from a clone of `estimator` instead of `method.build(seed)`
    pub fn with_estimator(mut self, estimator: Box<dyn Estimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn with_tuner(mut self, tuner: Option<HyperparameterTuner>) -> Self {
        self.tuner = tuner;
        self
    }

    pub fn with_selector(mut self, selector: Option<FeatureSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_balanced_weights(mut self, balanced: bool) -> Self {
        self.balanced_weights = balanced;
        self
    }

    /// Folds hold out one sample; per-fold test scores and step scores are undefined
    pub fn with_leave_one_out(mut self, leave_one_out: bool) -> Self {
        self.leave_one_out = leave_one_out;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn evaluate(&self, fold: &Fold) -> Result<FoldOutcome> {
        let seed = self.random_state.wrapping_add(fold.fold_idx as u64);
        let x_train = self.x.select(Axis(0), &fold.train_indices);
        let y_train = self.y.select(Axis(0), &fold.train_indices);
        let sample_weight = compute_sample_weight(&y_train, self.balanced_weights);

        let mut estimator = match &self.estimator {
            Some(base) => base.clone_box(),
            None => self.method.build(seed),
        };
        if let Some(tuner) = &self.tuner {
            let (tuned, _study) =
                tuner.tune(estimator.as_ref(), &x_train, &y_train, &sample_weight)?;
            estimator = tuned;
        }

        let x_test = self.x.select(Axis(0), &fold.test_indices);
        let y_test = self.y.select(Axis(0), &fold.test_indices);

        let (selected_features, rfe) = match &self.selector {
            Some(selector) => {
                let step_score = if fold.is_pseudo() {
                    StepScore::Skip
                } else if self.leave_one_out {
                    StepScore::Undefined
                } else {
                    StepScore::Holdout {
                        x_test: &x_test,
                        y_test: &y_test,
                        metric: self.metric,
                    }
                };
                let selection = selector.seeded(seed).select(
                    estimator.as_ref(),
                    &x_train,
                    &y_train,
                    &sample_weight,
                    &step_score,
                )?;
                (selection.selected_features, selection.rfe)
            }
            None => ((0..self.x.ncols()).collect(), None),
        };

        estimator.fit(&x_train.select(Axis(1), &selected_features), &y_train, &sample_weight)?;

        let x_selected = self.x.select(Axis(1), &selected_features);
        let predictions = positive_scores(estimator.as_ref(), &x_selected)?;
        let predicted_labels = estimator.predict(&x_selected)?;
        let importances = feature_importances(estimator.as_ref())?;

        let (train_score, test_score) = if fold.is_pseudo() {
            (None, None)
        } else {
            let train_score = self
                .metric
                .score(&y_train, &predictions.select(Axis(0), &fold.train_indices))?;
            let test_score = if self.leave_one_out {
                None
            } else {
                Some(self.metric.score(&y_test, &predictions.select(Axis(0), &fold.test_indices))?)
            };
            (Some(train_score), test_score)
        };

        if fold.is_pseudo() {
            info!(n_features = selected_features.len(), "fitted final model on all samples");
        } else {
            debug!(
                fold = fold.fold_idx,
                n_train = fold.train_indices.len(),
                n_test = fold.test_indices.len(),
                train_score = ?train_score,
                test_score = ?test_score,
                "fold finished"
            );
        }

        Ok(FoldOutcome {
            fold_idx: fold.fold_idx,
            is_pseudo: fold.is_pseudo(),
            train_indices: fold.train_indices.clone(),
            test_indices: fold.test_indices.clone(),
            predictions,
            predicted_labels,
            selected_features,
            importances,
            estimator,
            train_score,
            test_score,
            rfe,
        })
    }
}
