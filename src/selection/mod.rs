//! Feature selection inside a fold
//!
//! Three variants share one contract, `select(estimator, X_train, y_train,
//! sample_weight) -> SelectionResult`:
//! - top-k by importance magnitude from a single fit
//! - recursive elimination with optional step scores
//! - robust selection by stability across resampling runs

pub mod importance;
pub mod rfe;
pub mod robust;

pub use importance::{rank_by_magnitude, top_k, TopKImportance};
pub use rfe::{resolve_step, RecursiveElimination, RfeTrace, StepScore};
pub use robust::{ResampleMethod, RobustResample, RobustTrace};

use crate::error::Result;
use crate::training::Estimator;
use ndarray::{Array1, Array2};

/// Output of a selector on one training partition
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Selected column indices, no duplicates
    pub selected_features: Vec<usize>,
    /// Estimator as fitted by the selector
    pub estimator: Box<dyn Estimator>,
    /// Score per original column: importance magnitude or stability fraction
    pub feature_scores: Vec<f64>,
    /// Elimination ranking, 1 for survivors
    pub ranking: Option<Vec<usize>>,
    pub rfe: Option<RfeTrace>,
    pub robust: Option<RobustTrace>,
}

/// Selector configured for a run
#[derive(Debug, Clone)]
pub enum FeatureSelector {
    TopK(TopKImportance),
    Rfe(RecursiveElimination),
    Robust(RobustResample),
}

impl FeatureSelector {
    pub fn n_select(&self) -> usize {
        match self {
            FeatureSelector::TopK(s) => s.n_select,
            FeatureSelector::Rfe(s) => s.n_select,
            FeatureSelector::Robust(s) => s.n_select,
        }
    }

    /// Run the selector; `step_score` is only consulted by recursive elimination
    pub fn select(
        &self,
        estimator: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
        step_score: &StepScore<'_>,
    ) -> Result<SelectionResult> {
        match self {
            FeatureSelector::TopK(s) => s.select(estimator, x, y, sample_weight),
            FeatureSelector::Rfe(s) => s.select(estimator, x, y, sample_weight, step_score),
            FeatureSelector::Robust(s) => s.select(estimator, x, y, sample_weight),
        }
    }

    /// Same selector with a per-fold seed, only robust selection draws random numbers
    pub fn seeded(&self, seed: u64) -> Self {
        match self {
            FeatureSelector::Robust(s) => {
                FeatureSelector::Robust(s.clone().with_random_state(seed))
            }
            other => other.clone(),
        }
    }
}
