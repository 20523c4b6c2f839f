//! Recursive feature elimination

use crate::error::{ExseekError, Result};
use crate::training::{feature_importances, positive_scores, Estimator, Metric};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::importance::rank_by_magnitude;
use super::SelectionResult;

/// How each elimination step is scored
pub enum StepScore<'a> {
    /// No held-out partition, nothing is computed
    Skip,
    /// A single held-out sample; ranking metrics are undefined
    Undefined,
    /// Score the step's estimator on a held-out partition
    Holdout {
        x_test: &'a Array2<f64>,
        y_test: &'a Array1<f64>,
        metric: &'a dyn Metric,
    },
}

impl StepScore<'_> {
    fn compute(&self, estimator: &dyn Estimator, features: &[usize]) -> Result<f64> {
        match self {
            StepScore::Skip | StepScore::Undefined => Ok(f64::NAN),
            StepScore::Holdout { x_test, y_test, metric } => {
                let scores = positive_scores(estimator, &x_test.select(Axis(1), features))?;
                metric.score(y_test, &scores)
            }
        }
    }
}

/// Per-fit record of an elimination run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfeTrace {
    /// Surviving feature count at each fit, strictly decreasing, ending at `n_select`
    pub n_features_step: Vec<usize>,
    /// Step score at each fit, NaN when no score was computed
    pub scores: Vec<f64>,
}

/// Convert a step given as a count or as a fraction in (0, 1) into a count
pub fn resolve_step(step: f64, n_features: usize) -> Result<usize> {
    if !(step > 0.0) || !step.is_finite() {
        return Err(ExseekError::ConfigError(format!(
            "rfe step must be positive, got {}",
            step
        )));
    }
    if step < 1.0 {
        Ok(((step * n_features as f64).round() as usize).max(1))
    } else {
        Ok(step.round() as usize)
    }
}

/// Drop the `step` least important features per fit until `n_select` remain
#[derive(Debug, Clone)]
pub struct RecursiveElimination {
    pub n_select: usize,
    pub step: usize,
}

impl RecursiveElimination {
    pub fn new(n_select: usize, step: usize) -> Self {
        Self {
            n_select,
            step: step.max(1),
        }
    }

    pub fn select(
        &self,
        base: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
        step_score: &StepScore<'_>,
    ) -> Result<SelectionResult> {
        let n_features = x.ncols();
        if self.n_select == 0 || self.n_select > n_features {
            return Err(ExseekError::ConfigError(format!(
                "n_select must be in [1, {}], got {}",
                n_features, self.n_select
            )));
        }

        let mut support: Vec<usize> = (0..n_features).collect();
        let mut ranking = vec![1usize; n_features];
        let mut eliminated = vec![false; n_features];
        let mut trace = RfeTrace {
            n_features_step: Vec::new(),
            scores: Vec::new(),
        };

        loop {
            let mut estimator = base.clone_box();
            estimator.fit(&x.select(Axis(1), &support), y, sample_weight)?;
            trace.n_features_step.push(support.len());
            trace.scores.push(step_score.compute(estimator.as_ref(), &support)?);

            if support.len() <= self.n_select {
                debug!(n_fits = trace.scores.len(), n_select = self.n_select, "rfe finished");
                let importances = feature_importances(estimator.as_ref())?;
                let mut feature_scores = vec![0.0; n_features];
                for (pos, &feature) in support.iter().enumerate() {
                    feature_scores[feature] = importances[pos].abs();
                }
                return Ok(SelectionResult {
                    selected_features: support,
                    feature_scores,
                    estimator,
                    ranking: Some(ranking),
                    rfe: Some(trace),
                    robust: None,
                });
            }

            let importances = feature_importances(estimator.as_ref())?;
            let n_keep = support.len() - self.step.min(support.len() - self.n_select);
            let order = rank_by_magnitude(&importances);

            for &pos in &order[n_keep..] {
                eliminated[support[pos]] = true;
            }
            // every eliminated feature sinks one rank per step, so earlier drops rank lower
            for (rank, _) in ranking.iter_mut().zip(&eliminated).filter(|(_, &gone)| gone) {
                *rank += 1;
            }
            let mut kept: Vec<usize> = order[..n_keep].iter().map(|&pos| support[pos]).collect();
            kept.sort_unstable();
            support = kept;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{LogisticRegression, RocAuc};
    use ndarray::Array;

    /// Column `j` carries signal proportional to `j`, so higher columns survive
    fn graded(n_samples: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
        let y = Array1::from_iter((0..n_samples).map(|i| (i % 2) as f64));
        let x = Array::from_shape_fn((n_samples, n_features), |(i, j)| {
            let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
            sign * (j as f64 + 1.0) / n_features as f64 + 0.01 * ((i * 7 + j * 3) % 5) as f64
        });
        (x, y)
    }

    #[test]
    fn test_resolve_step() {
        assert_eq!(resolve_step(0.1, 200).unwrap(), 20);
        assert_eq!(resolve_step(0.001, 200).unwrap(), 1);
        assert_eq!(resolve_step(3.0, 200).unwrap(), 3);
        assert!(resolve_step(0.0, 200).unwrap_err().is_configuration());
    }

    #[test]
    fn test_fraction_step_schedule() {
        let (x, y) = graded(12, 200);
        let rfe = RecursiveElimination::new(20, resolve_step(0.1, 200).unwrap());
        let result = rfe
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(12), &StepScore::Skip)
            .unwrap();

        let trace = result.rfe.unwrap();
        let expected: Vec<usize> = (1..=10).rev().map(|k| k * 20).collect();
        assert_eq!(trace.n_features_step, expected);
        assert_eq!(trace.scores.len(), 10);
        assert!(trace.scores.iter().all(|s| s.is_nan()));
        assert_eq!(result.selected_features.len(), 20);
    }

    #[test]
    fn test_ranking_marks_exactly_n_select() {
        let (x, y) = graded(10, 9);
        let rfe = RecursiveElimination::new(3, 2);
        let result = rfe
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(10), &StepScore::Skip)
            .unwrap();

        let ranking = result.ranking.unwrap();
        assert_eq!(ranking.iter().filter(|&&r| r == 1).count(), 3);
        let rank_one: Vec<usize> = (0..9).filter(|&j| ranking[j] == 1).collect();
        assert_eq!(rank_one, result.selected_features);
        // last step removes only what is needed: 9 -> 7 -> 5 -> 3
        assert_eq!(result.rfe.unwrap().n_features_step, vec![9, 7, 5, 3]);
    }

    #[test]
    fn test_holdout_step_scores() {
        let (x, y) = graded(12, 6);
        let rfe = RecursiveElimination::new(2, 2);
        let metric = RocAuc;
        let step_score = StepScore::Holdout {
            x_test: &x,
            y_test: &y,
            metric: &metric,
        };
        let result = rfe
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(12), &step_score)
            .unwrap();
        let trace = result.rfe.unwrap();
        assert_eq!(trace.scores.len(), 3);
        assert!(trace.scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_n_select_larger_than_features() {
        let (x, y) = graded(6, 3);
        let err = RecursiveElimination::new(5, 1)
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(6), &StepScore::Skip)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
