//! Importance ranking and the top-k selector

use crate::error::Result;
use crate::training::{feature_importances, Estimator};
use ndarray::{Array1, Array2};
use std::cmp::Ordering;

use super::SelectionResult;

/// Column indices ordered by descending `|score|`, lower index first on ties
pub fn rank_by_magnitude(scores: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable, so equal magnitudes keep ascending index order
    order.sort_by(|&a, &b| {
        scores[b]
            .abs()
            .partial_cmp(&scores[a].abs())
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// The `k` highest-magnitude columns, best first
pub fn top_k(scores: &Array1<f64>, k: usize) -> Vec<usize> {
    let mut order = rank_by_magnitude(scores);
    order.truncate(k);
    order
}

/// Fit once on the full training partition and keep the `n_select` most important features
#[derive(Debug, Clone)]
pub struct TopKImportance {
    pub n_select: usize,
}

impl TopKImportance {
    pub fn new(n_select: usize) -> Self {
        Self { n_select }
    }

    pub fn select(
        &self,
        base: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
    ) -> Result<SelectionResult> {
        let mut estimator = base.clone_box();
        estimator.fit(x, y, sample_weight)?;
        let importances = feature_importances(estimator.as_ref())?;

        Ok(SelectionResult {
            selected_features: top_k(&importances, self.n_select),
            feature_scores: importances.mapv(f64::abs).to_vec(),
            estimator,
            ranking: None,
            rfe: None,
            robust: None,
        })
    }
}
