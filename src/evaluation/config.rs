//! Evaluation run configuration

use crate::error::{ExseekError, Result};
use crate::selection::{
    resolve_step, FeatureSelector, RecursiveElimination, ResampleMethod, RobustResample,
    TopKImportance,
};
use crate::training::{metrics, Method, Metric, SplitPlanner, SplitStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one cross-validated evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Classifier used for selection and scoring
    pub method: String,

    /// Resampling strategy name
    pub splitter: String,

    pub n_splits: usize,

    /// Repeats for the repeated strategies
    pub n_repeats: usize,

    /// Test fraction for the shuffle-split strategies
    pub test_size: f64,

    /// Metric reported in the metrics table
    pub scorer: String,

    /// Number of features to select; `None` keeps every feature
    pub n_select: Option<usize>,

    /// Select by recursive elimination
    pub rfe: bool,

    /// Features removed per elimination step, a count or a fraction in (0, 1)
    pub rfe_step: f64,

    /// Select by stability across resampling runs
    pub robust_select: bool,

    pub robust_resample_method: String,

    pub robust_max_runs: usize,

    /// Samples removed per jackknife run, a count or a fraction in (0, 1)
    pub robust_jackknife_remove: f64,

    /// Class-balanced sample weights
    pub compute_sample_weight: bool,

    /// Grid search inside every fold
    pub tune: bool,

    /// Inner folds used by the grid search
    pub inner_cv_folds: usize,

    /// Random seed for reproducibility
    pub random_state: u64,

    /// Evaluate folds and resampling runs concurrently
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            method: "logistic_regression".to_string(),
            splitter: "stratified_kfold".to_string(),
            n_splits: 5,
            n_repeats: 10,
            test_size: 0.2,
            scorer: "roc_auc".to_string(),
            n_select: None,
            rfe: false,
            rfe_step: 1.0,
            robust_select: false,
            robust_resample_method: "jackknife".to_string(),
            robust_max_runs: 50,
            robust_jackknife_remove: 1.0,
            compute_sample_weight: false,
            tune: true,
            inner_cv_folds: 5,
            random_state: 0,
            parallel: false,
        }
    }
}

impl EvaluationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_splitter(mut self, splitter: impl Into<String>) -> Self {
        self.splitter = splitter.into();
        self
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_scorer(mut self, scorer: impl Into<String>) -> Self {
        self.scorer = scorer.into();
        self
    }

    pub fn with_n_select(mut self, n_select: usize) -> Self {
        self.n_select = Some(n_select);
        self
    }

    /// Enable recursive elimination with the given step
    pub fn with_rfe(mut self, step: f64) -> Self {
        self.rfe = true;
        self.rfe_step = step;
        self
    }

    /// Enable robust selection
    pub fn with_robust_select(
        mut self,
        resample_method: impl Into<String>,
        max_runs: usize,
    ) -> Self {
        self.robust_select = true;
        self.robust_resample_method = resample_method.into();
        self.robust_max_runs = max_runs;
        self
    }

    pub fn with_jackknife_remove(mut self, remove: f64) -> Self {
        self.robust_jackknife_remove = remove;
        self
    }

    pub fn with_sample_weight(mut self, balanced: bool) -> Self {
        self.compute_sample_weight = balanced;
        self
    }

    pub fn with_tune(mut self, tune: bool) -> Self {
        self.tune = tune;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn method(&self) -> Result<Method> {
        Method::from_name(&self.method)
    }

    pub fn strategy(&self) -> Result<SplitStrategy> {
        SplitStrategy::from_name(&self.splitter)
    }

    pub fn metric(&self) -> Result<Box<dyn Metric>> {
        metrics::from_name(&self.scorer)
    }

    pub fn resample_method(&self) -> Result<ResampleMethod> {
        ResampleMethod::from_name(&self.robust_resample_method, self.robust_jackknife_remove)
    }

    pub fn selection_active(&self) -> bool {
        self.n_select.is_some()
    }

    /// Recursive elimination is the fold's own selector (not nested inside robust runs)
    pub fn rfe_active(&self) -> bool {
        self.selection_active() && self.rfe && !self.robust_select
    }

    pub fn planner(&self) -> Result<SplitPlanner> {
        Ok(SplitPlanner::new(self.strategy()?)
            .with_n_splits(self.n_splits)
            .with_n_repeats(self.n_repeats)
            .with_test_size(self.test_size)
            .with_random_state(self.random_state))
    }

    /// Check every name and option; nothing here touches data
    pub fn validate(&self) -> Result<()> {
        self.method()?;
        let strategy = self.strategy()?;
        self.metric()?;

        match strategy {
            SplitStrategy::LeaveOneOut => {}
            SplitStrategy::ShuffleSplit | SplitStrategy::StratifiedShuffleSplit => {
                if self.n_splits == 0 {
                    return Err(ExseekError::ConfigError("n_splits must be at least 1".to_string()));
                }
                if !(self.test_size > 0.0 && self.test_size < 1.0) {
                    return Err(ExseekError::ConfigError(format!(
                        "test_size must be in (0, 1), got {}",
                        self.test_size
                    )));
                }
            }
            _ => {
                if self.n_splits < 2 {
                    return Err(ExseekError::ConfigError("n_splits must be at least 2".to_string()));
                }
                if strategy.is_repeated() && self.n_repeats == 0 {
                    return Err(ExseekError::ConfigError(
                        "n_repeats must be at least 1".to_string(),
                    ));
                }
            }
        }

        match self.n_select {
            Some(0) => {
                return Err(ExseekError::ConfigError("n_select must be at least 1".to_string()));
            }
            None if self.rfe || self.robust_select => {
                return Err(ExseekError::ConfigError(
                    "--rfe and --robust-select require --n-select".to_string(),
                ));
            }
            _ => {}
        }

        if self.rfe {
            resolve_step(self.rfe_step, 1)?;
        }
        if self.robust_select {
            self.resample_method()?;
            if self.robust_max_runs == 0 {
                return Err(ExseekError::ConfigError(
                    "robust_max_runs must be at least 1".to_string(),
                ));
            }
        }
        if self.tune && self.inner_cv_folds < 2 {
            return Err(ExseekError::ConfigError(
                "inner_cv_folds must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Selector for a matrix with `n_features` columns, `None` when selection is off
    pub fn selector(&self, n_features: usize) -> Result<Option<FeatureSelector>> {
        let Some(n_select) = self.n_select else {
            return Ok(None);
        };
        if n_select > n_features {
            return Err(ExseekError::ConfigError(format!(
                "n_select ({}) exceeds the number of features ({})",
                n_select, n_features
            )));
        }

        let selector = if self.robust_select {
            let method = self.resample_method()?;
            let mut robust = RobustResample::new(n_select, method, self.robust_max_runs)
                .with_parallel(self.parallel)
                .with_random_state(self.random_state);
            if self.rfe {
                robust = robust.with_rfe_step(resolve_step(self.rfe_step, n_features)?);
            }
            FeatureSelector::Robust(robust)
        } else if self.rfe {
            FeatureSelector::Rfe(RecursiveElimination::new(
                n_select,
                resolve_step(self.rfe_step, n_features)?,
            ))
        } else {
            FeatureSelector::TopK(TopKImportance::new(n_select))
        };
        Ok(Some(selector))
    }

    /// Load a configuration from a JSON file, missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.n_splits, 5);
        assert_eq!(config.n_repeats, 10);
        assert_eq!(config.robust_max_runs, 50);
        assert_eq!(config.scorer, "roc_auc");
        assert!(config.tune);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_names_are_configuration_errors() {
        for config in [
            EvaluationConfig::new().with_method("xgboost"),
            EvaluationConfig::new().with_splitter("group_kfold"),
            EvaluationConfig::new().with_scorer("f1"),
            EvaluationConfig::new().with_n_select(5).with_robust_select("subsample", 10),
        ] {
            assert!(config.validate().unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_selection_flags_need_n_select() {
        let config = EvaluationConfig::new().with_rfe(0.1);
        assert!(config.validate().is_err());
        assert!(config.with_n_select(10).validate().is_ok());
    }

    #[test]
    fn test_selector_variants() {
        let topk = EvaluationConfig::new().with_n_select(3).selector(10).unwrap();
        assert!(matches!(topk, Some(FeatureSelector::TopK(_))));

        let rfe = EvaluationConfig::new().with_n_select(20).with_rfe(0.1).selector(200).unwrap();
        match rfe {
            Some(FeatureSelector::Rfe(r)) => assert_eq!(r.step, 20),
            other => panic!("expected rfe selector, got {:?}", other),
        }

        let robust = EvaluationConfig::new()
            .with_n_select(5)
            .with_rfe(1.0)
            .with_robust_select("bootstrap", 10)
            .selector(50)
            .unwrap();
        match robust {
            Some(FeatureSelector::Robust(r)) => assert_eq!(r.rfe_step, Some(1)),
            other => panic!("expected robust selector, got {:?}", other),
        }

        assert!(EvaluationConfig::new().selector(10).unwrap().is_none());
        assert!(EvaluationConfig::new().with_n_select(11).selector(10).is_err());
    }

    #[test]
    fn test_json_round_trip_uses_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"method": "random_forest", "n_select": 10}"#).unwrap();

        let config = EvaluationConfig::from_json_file(&path).unwrap();
        assert_eq!(config.method, "random_forest");
        assert_eq!(config.n_select, Some(10));
        assert_eq!(config.n_splits, 5);

        config.save_json(&path).unwrap();
        assert_eq!(EvaluationConfig::from_json_file(&path).unwrap(), config);
    }
}
