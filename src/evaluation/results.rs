//! Fold-indexed result arrays and the metrics table

use crate::error::{ExseekError, Result};
use crate::training::{CVResults, Estimator, Metric, SplitPlanner};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::fold::FoldOutcome;

/// One row of the metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub fold_idx: usize,
    /// Only set for the repeated strategies
    pub repeat: Option<usize>,
    pub split: usize,
    pub train_score: f64,
    /// Absent for leave-one-out folds
    pub test_score: Option<f64>,
}

/// Final model of a run, taken from the pseudo-fold
#[derive(Debug, Clone)]
pub struct FinalModel {
    pub estimator: Box<dyn Estimator>,
    pub features: Vec<usize>,
    /// Aligned to `features`
    pub importances: Array1<f64>,
}

/// Aggregated state of a finished run.
///
/// Fold-indexed matrices have one row per scored fold plus a trailing row for
/// the pseudo-fold.
#[derive(Debug, Clone)]
pub struct ResultBundle {
    pub strategy: String,
    pub scorer: String,
    pub labels: Array1<f64>,
    pub train_index_matrix: Array2<bool>,
    pub predictions: Array2<f64>,
    pub predicted_labels: Array2<f64>,
    pub feature_selection_matrix: Option<Array2<bool>>,
    pub rfe_n_features_step: Option<Vec<usize>>,
    pub rfe_scores: Option<Array2<f64>>,
    pub metrics: Vec<MetricRecord>,
    /// Leave-one-out score over all out-of-fold predictions
    pub aggregate_test_score: Option<f64>,
    pub final_model: FinalModel,
}

impl ResultBundle {
    pub fn n_folds(&self) -> usize {
        self.predictions.nrows()
    }

    /// Summary of the per-fold test scores
    pub fn test_summary(&self) -> CVResults {
        CVResults::from_scores(
            self.metrics
                .iter()
                .map(|m| m.test_score.unwrap_or(f64::NAN))
                .collect(),
        )
    }
}

/// Collects fold outcomes into pre-allocated fold-indexed arrays
pub struct ResultAggregator<'a> {
    planner: &'a SplitPlanner,
    metric: &'a dyn Metric,
    labels: Array1<f64>,
    train_index_matrix: Array2<bool>,
    predictions: Array2<f64>,
    predicted_labels: Array2<f64>,
    feature_selection_matrix: Option<Array2<bool>>,
    rfe_active: bool,
    rfe_n_features_step: Option<Vec<usize>>,
    rfe_scores: Option<Array2<f64>>,
    records: Vec<Option<MetricRecord>>,
    loo_test_positions: Vec<Option<usize>>,
    final_model: Option<FinalModel>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(
        planner: &'a SplitPlanner,
        metric: &'a dyn Metric,
        labels: Array1<f64>,
        n_features: usize,
        selection_active: bool,
        rfe_active: bool,
    ) -> Self {
        let n_samples = labels.len();
        let n_scored = planner.n_scored_folds(n_samples);
        let n_rows = n_scored + 1;
        Self {
            planner,
            metric,
            train_index_matrix: Array2::from_elem((n_rows, n_samples), false),
            predictions: Array2::from_elem((n_rows, n_samples), f64::NAN),
            predicted_labels: Array2::from_elem((n_rows, n_samples), f64::NAN),
            feature_selection_matrix: selection_active
                .then(|| Array2::from_elem((n_rows, n_features), false)),
            rfe_active,
            rfe_n_features_step: None,
            rfe_scores: None,
            records: vec![None; n_scored],
            loo_test_positions: vec![None; n_scored],
            final_model: None,
            labels,
        }
    }

    /// Write one fold's row; rows may arrive in any order
    pub fn record(&mut self, outcome: FoldOutcome) -> Result<()> {
        let row = outcome.fold_idx;
        if row >= self.predictions.nrows() {
            return Err(ExseekError::ShapeError {
                expected: format!("fold index < {}", self.predictions.nrows()),
                actual: row.to_string(),
            });
        }

        for &i in &outcome.train_indices {
            self.train_index_matrix[[row, i]] = true;
        }
        self.predictions.row_mut(row).assign(&outcome.predictions);
        self.predicted_labels.row_mut(row).assign(&outcome.predicted_labels);
        if let Some(matrix) = self.feature_selection_matrix.as_mut() {
            for &f in &outcome.selected_features {
                matrix[[row, f]] = true;
            }
        }

        if self.rfe_active {
            if let Some(trace) = &outcome.rfe {
                // the step schedule only depends on n_features and step, so the first fold fixes it
                if self.rfe_n_features_step.is_none() {
                    self.rfe_n_features_step = Some(trace.n_features_step.clone());
                    self.rfe_scores = Some(Array2::from_elem(
                        (self.predictions.nrows(), trace.scores.len()),
                        f64::NAN,
                    ));
                }
                let scores = self.rfe_scores.as_mut().ok_or_else(|| {
                    ExseekError::ComputationError("rfe score matrix missing".to_string())
                })?;
                if trace.scores.len() != scores.ncols() {
                    return Err(ExseekError::ShapeError {
                        expected: format!("{} rfe steps", scores.ncols()),
                        actual: format!("{} rfe steps", trace.scores.len()),
                    });
                }
                scores.row_mut(row).assign(&Array1::from_vec(trace.scores.clone()));
            }
        }

        if outcome.is_pseudo {
            self.final_model = Some(FinalModel {
                estimator: outcome.estimator,
                features: outcome.selected_features,
                importances: outcome.importances,
            });
        } else {
            let (repeat, split) = self.planner.fold_position(row);
            self.records[row] = Some(MetricRecord {
                fold_idx: row,
                repeat,
                split,
                train_score: outcome.train_score.unwrap_or(f64::NAN),
                test_score: outcome.test_score,
            });
            if self.planner.strategy().is_leave_one_out() {
                self.loo_test_positions[row] = outcome.test_indices.first().copied();
            }
        }
        Ok(())
    }

    /// Build the bundle once every fold has been recorded
    pub fn finish(self) -> Result<ResultBundle> {
        let final_model = self.final_model.ok_or_else(|| {
            ExseekError::ComputationError("pseudo-fold was never recorded".to_string())
        })?;
        let metrics: Vec<MetricRecord> = self
            .records
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.ok_or_else(|| {
                    ExseekError::ComputationError(format!("fold {} was never recorded", i))
                })
            })
            .collect::<Result<_>>()?;

        let aggregate_test_score = if self.planner.strategy().is_leave_one_out() {
            let mut out_of_fold = Array1::from_elem(self.labels.len(), f64::NAN);
            for (row, position) in self.loo_test_positions.iter().enumerate() {
                if let Some(sample) = position {
                    out_of_fold[*sample] = self.predictions[[row, *sample]];
                }
            }
            Some(self.metric.score(&self.labels, &out_of_fold)?)
        } else {
            None
        };

        Ok(ResultBundle {
            strategy: self.planner.strategy().name().to_string(),
            scorer: self.metric.name().to_string(),
            labels: self.labels,
            train_index_matrix: self.train_index_matrix,
            predictions: self.predictions,
            predicted_labels: self.predicted_labels,
            feature_selection_matrix: self.feature_selection_matrix,
            rfe_n_features_step: self.rfe_n_features_step,
            rfe_scores: self.rfe_scores,
            metrics,
            aggregate_test_score,
            final_model,
        })
    }
}
