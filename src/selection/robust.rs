//! Resampling-based robust selection
//!
//! Every run selects features on a jackknife or bootstrap subset of the
//! training partition. Features are then ranked by how often they were chosen.

use crate::error::{ExseekError, Result};
use crate::training::{feature_importances, Estimator};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::importance::{top_k, TopKImportance};
use super::rfe::{RecursiveElimination, StepScore};
use super::SelectionResult;

/// How a run's training subset is drawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResampleMethod {
    /// Remove `remove` samples (a count when >= 1, else a fraction) without replacement
    Jackknife { remove: f64 },
    /// Draw `|train|` samples with replacement
    Bootstrap,
}

impl ResampleMethod {
    pub fn from_name(name: &str, remove: f64) -> Result<Self> {
        match name {
            "jackknife" => {
                if !(remove > 0.0) || !remove.is_finite() {
                    return Err(ExseekError::ConfigError(format!(
                        "jackknife remove must be positive, got {}",
                        remove
                    )));
                }
                Ok(ResampleMethod::Jackknife { remove })
            }
            "bootstrap" => Ok(ResampleMethod::Bootstrap),
            other => Err(ExseekError::ConfigError(format!(
                "unknown resample method: {}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResampleMethod::Jackknife { .. } => "jackknife",
            ResampleMethod::Bootstrap => "bootstrap",
        }
    }

    /// Number of samples a jackknife run removes from `n_train`
    pub fn n_removed(&self, n_train: usize) -> usize {
        match self {
            ResampleMethod::Jackknife { remove } if *remove >= 1.0 => remove.round() as usize,
            ResampleMethod::Jackknife { remove } => (remove * n_train as f64).round() as usize,
            ResampleMethod::Bootstrap => 0,
        }
    }

    /// Row positions (into the training partition) of one run's subset
    pub fn draw(&self, n_train: usize, rng: &mut ChaCha8Rng) -> Result<Vec<usize>> {
        match self {
            ResampleMethod::Jackknife { .. } => {
                let n_removed = self.n_removed(n_train);
                if n_removed >= n_train {
                    return Err(ExseekError::DataError(format!(
                        "jackknife would remove {} of {} training samples",
                        n_removed, n_train
                    )));
                }
                let mut removed = vec![false; n_train];
                for i in sample(rng, n_train, n_removed).into_iter() {
                    removed[i] = true;
                }
                Ok((0..n_train).filter(|&i| !removed[i]).collect())
            }
            ResampleMethod::Bootstrap => {
                Ok((0..n_train).map(|_| rng.gen_range(0..n_train)).collect())
            }
        }
    }
}

/// Per-run record of a robust selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustTrace {
    pub n_runs: usize,
    pub subset_sizes: Vec<usize>,
    /// Fraction of runs that selected each feature
    pub stability: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RobustResample {
    pub n_select: usize,
    pub method: ResampleMethod,
    pub max_runs: usize,
    /// Select within each run by recursive elimination with this step
    pub rfe_step: Option<usize>,
    pub parallel: bool,
    pub random_state: u64,
}

impl RobustResample {
    pub fn new(n_select: usize, method: ResampleMethod, max_runs: usize) -> Self {
        Self {
            n_select,
            method,
            max_runs,
            rfe_step: None,
            parallel: false,
            random_state: 0,
        }
    }

    pub fn with_rfe_step(mut self, step: usize) -> Self {
        self.rfe_step = Some(step);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn run_once(
        &self,
        base: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
        subset: &[usize],
    ) -> Result<Vec<usize>> {
        let x_sub = x.select(Axis(0), subset);
        let y_sub = y.select(Axis(0), subset);
        let w_sub = sample_weight.select(Axis(0), subset);
        let result = match self.rfe_step {
            Some(step) => RecursiveElimination::new(self.n_select, step)
                .select(base, &x_sub, &y_sub, &w_sub, &StepScore::Skip)?,
            None => TopKImportance::new(self.n_select).select(base, &x_sub, &y_sub, &w_sub)?,
        };
        Ok(result.selected_features)
    }

    pub fn select(
        &self,
        base: &dyn Estimator,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &Array1<f64>,
    ) -> Result<SelectionResult> {
        let n_features = x.ncols();
        if self.max_runs == 0 {
            return Err(ExseekError::ConfigError("robust_max_runs must be at least 1".to_string()));
        }
        if self.n_select == 0 || self.n_select > n_features {
            return Err(ExseekError::ConfigError(format!(
                "n_select must be in [1, {}], got {}",
                n_features, self.n_select
            )));
        }

        // Draws come from one sequential stream so they do not depend on scheduling
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let subsets: Vec<Vec<usize>> = (0..self.max_runs)
            .map(|_| self.method.draw(x.nrows(), &mut rng))
            .collect::<Result<_>>()?;

        let selections: Vec<Vec<usize>> = if self.parallel {
            subsets
                .par_iter()
                .map(|subset| self.run_once(base, x, y, sample_weight, subset))
                .collect::<Result<_>>()?
        } else {
            subsets
                .iter()
                .map(|subset| self.run_once(base, x, y, sample_weight, subset))
                .collect::<Result<_>>()?
        };

        let mut counts = vec![0usize; n_features];
        for features in &selections {
            for &f in features {
                counts[f] += 1;
            }
        }
        let stability: Array1<f64> = counts
            .iter()
            .map(|&c| c as f64 / self.max_runs as f64)
            .collect();
        let selected_features = top_k(&stability, self.n_select);

        let mut estimator = base.clone_box();
        estimator.fit(&x.select(Axis(1), &selected_features), y, sample_weight)?;
        // the refit must still expose an importance path
        feature_importances(estimator.as_ref())?;

        debug!(
            runs = self.max_runs,
            method = self.method.name(),
            min_stability = selected_features
                .iter()
                .map(|&f| stability[f])
                .fold(f64::INFINITY, f64::min),
            "robust selection finished"
        );

        Ok(SelectionResult {
            selected_features,
            feature_scores: stability.to_vec(),
            estimator,
            ranking: None,
            rfe: None,
            robust: Some(RobustTrace {
                n_runs: self.max_runs,
                subset_sizes: subsets.iter().map(Vec::len).collect(),
                stability: stability.to_vec(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::LogisticRegression;
    use ndarray::Array;

    fn informative(
        n_samples: usize,
        n_features: usize,
        n_signal: usize,
    ) -> (Array2<f64>, Array1<f64>) {
        let y = Array1::from_iter((0..n_samples).map(|i| (i % 2) as f64));
        let x = Array::from_shape_fn((n_samples, n_features), |(i, j)| {
            let noise = (((i * 31 + j * 17) % 13) as f64 - 6.0) / 20.0;
            if j < n_signal {
                (if i % 2 == 1 { 1.0 } else { -1.0 }) + noise
            } else {
                noise
            }
        });
        (x, y)
    }

    #[test]
    fn test_jackknife_counts() {
        let method = ResampleMethod::from_name("jackknife", 0.2).unwrap();
        assert_eq!(method.n_removed(50), 10);
        assert_eq!(ResampleMethod::Jackknife { remove: 1.0 }.n_removed(50), 1);

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let subset = method.draw(50, &mut rng).unwrap();
        assert_eq!(subset.len(), 40);
        assert!(subset.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bootstrap_draw_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let subset = ResampleMethod::Bootstrap.draw(30, &mut rng).unwrap();
        assert_eq!(subset.len(), 30);
        assert!(subset.iter().all(|&i| i < 30));
    }

    #[test]
    fn test_unknown_resample_method() {
        assert!(ResampleMethod::from_name("holdout", 1.0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_robust_selection_is_reproducible() {
        let (x, y) = informative(50, 12, 5);
        let selector = RobustResample::new(5, ResampleMethod::Jackknife { remove: 0.2 }, 50)
            .with_random_state(3);
        let a = selector
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(50))
            .unwrap();
        let b = selector
            .clone()
            .with_parallel(true)
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(50))
            .unwrap();

        assert_eq!(a.selected_features, b.selected_features);
        assert_eq!(a.selected_features.len(), 5);

        let trace = a.robust.unwrap();
        assert_eq!(trace.n_runs, 50);
        assert!(trace.subset_sizes.iter().all(|&s| s == 40));
        assert!(trace.stability.iter().all(|s| (0.0..=1.0).contains(s)));

        // nothing outside the selection is more stable than what was selected
        let min_selected = a
            .selected_features
            .iter()
            .map(|&f| trace.stability[f])
            .fold(f64::INFINITY, f64::min);
        for f in (0..12).filter(|f| !a.selected_features.contains(f)) {
            assert!(trace.stability[f] <= min_selected);
        }
    }

    #[test]
    fn test_robust_with_rfe() {
        let (x, y) = informative(20, 8, 2);
        let result = RobustResample::new(2, ResampleMethod::Bootstrap, 10)
            .with_rfe_step(2)
            .select(&LogisticRegression::new(), &x, &y, &Array1::ones(20))
            .unwrap();
        assert_eq!(result.selected_features.len(), 2);
        assert!(result.rfe.is_none());
    }
}
