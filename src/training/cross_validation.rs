//! Resampling strategies and fold planning
//!
//! Every plan ends with a pseudo-fold that trains on all samples and has an
//! empty test partition. It produces the deployable model and is never scored.

use crate::error::{ExseekError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// K-Fold cross-validation, contiguous folds
    KFold,
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold,
    /// Shuffled K-Fold repeated `n_repeats` times
    RepeatedKFold,
    RepeatedStratifiedKFold,
    /// Independent random train/test splits
    ShuffleSplit,
    StratifiedShuffleSplit,
    /// Leave-one-out cross-validation
    LeaveOneOut,
}

impl SplitStrategy {
    pub const ALL: [SplitStrategy; 7] = [
        SplitStrategy::KFold,
        SplitStrategy::StratifiedKFold,
        SplitStrategy::RepeatedKFold,
        SplitStrategy::RepeatedStratifiedKFold,
        SplitStrategy::ShuffleSplit,
        SplitStrategy::StratifiedShuffleSplit,
        SplitStrategy::LeaveOneOut,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.name() == name)
            .ok_or_else(|| ExseekError::ConfigError(format!("unknown splitter: {}", name)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SplitStrategy::KFold => "kfold",
            SplitStrategy::StratifiedKFold => "stratified_kfold",
            SplitStrategy::RepeatedKFold => "repeated_kfold",
            SplitStrategy::RepeatedStratifiedKFold => "repeated_stratified_kfold",
            SplitStrategy::ShuffleSplit => "shuffle_split",
            SplitStrategy::StratifiedShuffleSplit => "stratified_shuffle_split",
            SplitStrategy::LeaveOneOut => "leave_one_out",
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(
            self,
            SplitStrategy::RepeatedKFold | SplitStrategy::RepeatedStratifiedKFold
        )
    }

    pub fn is_leave_one_out(&self) -> bool {
        matches!(self, SplitStrategy::LeaveOneOut)
    }
}

impl std::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single train/test split. Indices are sorted row positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

impl Fold {
    fn from_test(fold_idx: usize, n_samples: usize, mut test_indices: Vec<usize>) -> Self {
        test_indices.sort_unstable();
        let mut in_test = vec![false; n_samples];
        for &i in &test_indices {
            in_test[i] = true;
        }
        let train_indices = (0..n_samples).filter(|&i| !in_test[i]).collect();
        Self {
            train_indices,
            test_indices,
            fold_idx,
        }
    }

    /// Trailing fold without a test partition
    pub fn is_pseudo(&self) -> bool {
        self.test_indices.is_empty()
    }
}

/// Builds the ordered fold sequence of a run
#[derive(Debug, Clone)]
pub struct SplitPlanner {
    strategy: SplitStrategy,
    n_splits: usize,
    n_repeats: usize,
    test_size: f64,
    random_state: u64,
}

impl SplitPlanner {
    pub fn new(strategy: SplitStrategy) -> Self {
        Self {
            strategy,
            n_splits: 5,
            n_repeats: 10,
            test_size: 0.2,
            random_state: 0,
        }
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

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Number of scored folds for `n_samples` samples (pseudo-fold excluded)
    pub fn n_scored_folds(&self, n_samples: usize) -> usize {
        match self.strategy {
            SplitStrategy::KFold
            | SplitStrategy::StratifiedKFold
            | SplitStrategy::ShuffleSplit
            | SplitStrategy::StratifiedShuffleSplit => self.n_splits,
            SplitStrategy::RepeatedKFold | SplitStrategy::RepeatedStratifiedKFold => {
                self.n_splits * self.n_repeats
            }
            SplitStrategy::LeaveOneOut => n_samples,
        }
    }

    /// `(repeat, split)` coordinates of a scored fold, `repeat` only for repeated strategies
    pub fn fold_position(&self, fold_idx: usize) -> (Option<usize>, usize) {
        if self.strategy.is_repeated() {
            (Some(fold_idx / self.n_splits), fold_idx % self.n_splits)
        } else {
            (None, fold_idx)
        }
    }

    /// Scored folds followed by the pseudo-fold
    pub fn plan(&self, y: &Array1<f64>) -> Result<Vec<Fold>> {
        let n_samples = y.len();
        self.check(n_samples)?;

        let mut folds = match self.strategy {
            SplitStrategy::KFold => self.k_fold(n_samples, None, 0),
            SplitStrategy::StratifiedKFold => self.stratified_k_fold(y, None, 0),
            SplitStrategy::RepeatedKFold => (0..self.n_repeats)
                .flat_map(|repeat| {
                    let mut rng = self.repeat_rng(repeat);
                    self.k_fold(n_samples, Some(&mut rng), repeat * self.n_splits)
                })
                .collect(),
            SplitStrategy::RepeatedStratifiedKFold => (0..self.n_repeats)
                .flat_map(|repeat| {
                    let mut rng = self.repeat_rng(repeat);
                    self.stratified_k_fold(y, Some(&mut rng), repeat * self.n_splits)
                })
                .collect(),
            SplitStrategy::ShuffleSplit => self.shuffle_split(n_samples),
            SplitStrategy::StratifiedShuffleSplit => self.stratified_shuffle_split(y),
            SplitStrategy::LeaveOneOut => (0..n_samples)
                .map(|i| Fold::from_test(i, n_samples, vec![i]))
                .collect(),
        };

        folds.push(Fold {
            train_indices: (0..n_samples).collect(),
            test_indices: Vec::new(),
            fold_idx: folds.len(),
        });
        Ok(folds)
    }

    fn check(&self, n_samples: usize) -> Result<()> {
        match self.strategy {
            SplitStrategy::LeaveOneOut => {
                if n_samples < 2 {
                    return Err(ExseekError::DataError(format!(
                        "leave_one_out needs at least 2 samples, got {}",
                        n_samples
                    )));
                }
            }
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
                if n_samples < 2 {
                    return Err(ExseekError::DataError(format!(
                        "{} needs at least 2 samples, got {}",
                        self.strategy, n_samples
                    )));
                }
            }
            _ => {
                if self.n_splits < 2 {
                    return Err(ExseekError::ConfigError("n_splits must be at least 2".to_string()));
                }
                if self.strategy.is_repeated() && self.n_repeats == 0 {
                    return Err(ExseekError::ConfigError(
                        "n_repeats must be at least 1".to_string(),
                    ));
                }
                if n_samples < self.n_splits {
                    return Err(ExseekError::DataError(format!(
                        "n_samples ({}) must be >= n_splits ({})",
                        n_samples, self.n_splits
                    )));
                }
            }
        }
        Ok(())
    }

    fn repeat_rng(&self, repeat: usize) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.random_state.wrapping_add(repeat as u64))
    }

    fn fold_sizes(n: usize, n_splits: usize) -> impl Iterator<Item = usize> {
        let base = n / n_splits;
        let remainder = n % n_splits;
        (0..n_splits).map(move |i| if i < remainder { base + 1 } else { base })
    }

    fn k_fold(&self, n_samples: usize, rng: Option<&mut ChaCha8Rng>, offset: usize) -> Vec<Fold> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if let Some(rng) = rng {
            indices.shuffle(rng);
        }

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut current = 0;
        for (i, fold_size) in Self::fold_sizes(n_samples, self.n_splits).enumerate() {
            let test = indices[current..current + fold_size].to_vec();
            folds.push(Fold::from_test(offset + i, n_samples, test));
            current += fold_size;
        }
        folds
    }

    /// Per-class index lists, keyed by label so the order is deterministic
    fn class_indices(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
        let mut classes: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            classes.entry(val.round() as i64).or_default().push(idx);
        }
        classes
    }

    fn stratified_k_fold(
        &self,
        y: &Array1<f64>,
        rng: Option<&mut ChaCha8Rng>,
        offset: usize,
    ) -> Vec<Fold> {
        let mut classes = Self::class_indices(y);
        if let Some(rng) = rng {
            for indices in classes.values_mut() {
                indices.shuffle(rng);
            }
        }

        // Deal samples class by class into folds; the running position keeps fold sizes balanced
        let mut tests: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut position = 0;
        for indices in classes.values() {
            for &idx in indices {
                tests[position % self.n_splits].push(idx);
                position += 1;
            }
        }

        tests
            .into_iter()
            .enumerate()
            .map(|(i, test)| Fold::from_test(offset + i, y.len(), test))
            .collect()
    }

    fn n_test(&self, n: usize) -> usize {
        ((self.test_size * n as f64).ceil() as usize).clamp(1, n - 1)
    }

    fn shuffle_split(&self, n_samples: usize) -> Vec<Fold> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let n_test = self.n_test(n_samples);
        let mut indices: Vec<usize> = (0..n_samples).collect();

        (0..self.n_splits)
            .map(|i| {
                indices.shuffle(&mut rng);
                Fold::from_test(i, n_samples, indices[..n_test].to_vec())
            })
            .collect()
    }

    fn stratified_shuffle_split(&self, y: &Array1<f64>) -> Vec<Fold> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut classes = Self::class_indices(y);
        let n_samples = y.len();

        let quotas: Vec<usize> = classes
            .values()
            .map(|indices| {
                let n = indices.len();
                if n < 2 {
                    0
                } else {
                    ((self.test_size * n as f64).round() as usize).clamp(1, n - 1)
                }
            })
            .collect();

        (0..self.n_splits)
            .map(|i| {
                let mut test = Vec::new();
                for (indices, &quota) in classes.values_mut().zip(quotas.iter()) {
                    indices.shuffle(&mut rng);
                    test.extend_from_slice(&indices[..quota]);
                }
                Fold::from_test(i, n_samples, test)
            })
            .collect()
    }
}

/// Summary of per-fold scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores, skipping undefined (NaN) entries
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let defined: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
        let n = defined.len() as f64;
        let (mean_score, std_score) = if defined.is_empty() {
            (f64::NAN, f64::NAN)
        } else {
            let mean = defined.iter().sum::<f64>() / n;
            let variance = defined.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            (mean, variance.sqrt())
        };

        Self {
            n_folds: scores.len(),
            scores,
            mean_score,
            std_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_labels(n: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| if i < n / 2 { 0.0 } else { 1.0 }))
    }

    fn assert_disjoint(folds: &[Fold]) {
        for fold in folds {
            for i in &fold.test_indices {
                assert!(!fold.train_indices.contains(i));
            }
        }
    }

    #[test]
    fn test_k_fold() {
        let y = balanced_labels(100);
        let folds = SplitPlanner::new(SplitStrategy::KFold).plan(&y).unwrap();

        assert_eq!(folds.len(), 6);
        for fold in &folds[..5] {
            assert_eq!(fold.test_indices.len(), 20);
            assert_eq!(fold.train_indices.len(), 80);
        }
        assert_disjoint(&folds);

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = folds.iter().flat_map(|f| f.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_pseudo_fold_is_last() {
        let y = balanced_labels(10);
        let folds = SplitPlanner::new(SplitStrategy::StratifiedKFold).plan(&y).unwrap();
        let last = folds.last().unwrap();
        assert!(last.is_pseudo());
        assert_eq!(last.train_indices, (0..10).collect::<Vec<_>>());
        assert!(folds[..folds.len() - 1].iter().all(|f| !f.is_pseudo()));
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = balanced_labels(10);
        let folds = SplitPlanner::new(SplitStrategy::StratifiedKFold).plan(&y).unwrap();

        // Each fold should have 1 sample from each class
        for fold in &folds[..5] {
            assert_eq!(fold.test_indices.len(), 2);
            let positives = fold.test_indices.iter().filter(|&&i| y[i] > 0.5).count();
            assert_eq!(positives, 1);
        }
        assert_disjoint(&folds);
    }

    #[test]
    fn test_repeated_stratified_fold_count_and_rounds() {
        let y = balanced_labels(20);
        let planner = SplitPlanner::new(SplitStrategy::RepeatedStratifiedKFold)
            .with_n_splits(5)
            .with_n_repeats(3)
            .with_random_state(11);
        let folds = planner.plan(&y).unwrap();
        assert_eq!(folds.len(), 16);
        assert_eq!(planner.n_scored_folds(20), 15);

        for round in folds[..15].chunks(5) {
            let mut covered: Vec<usize> =
                round.iter().flat_map(|f| f.test_indices.clone()).collect();
            covered.sort();
            assert_eq!(covered, (0..20).collect::<Vec<_>>());
        }
        assert_eq!(planner.fold_position(7), (Some(1), 2));
    }

    #[test]
    fn test_shuffle_split_sizes() {
        let y = balanced_labels(20);
        let folds = SplitPlanner::new(SplitStrategy::StratifiedShuffleSplit)
            .with_n_splits(4)
            .with_test_size(0.2)
            .plan(&y)
            .unwrap();
        assert_eq!(folds.len(), 5);
        for fold in &folds[..4] {
            assert_eq!(fold.test_indices.len(), 4);
            assert_eq!(fold.train_indices.len(), 16);
        }
        assert_disjoint(&folds);
    }

    #[test]
    fn test_leave_one_out() {
        let y = balanced_labels(8);
        let folds = SplitPlanner::new(SplitStrategy::LeaveOneOut).plan(&y).unwrap();
        assert_eq!(folds.len(), 9);
        for (i, fold) in folds[..8].iter().enumerate() {
            assert_eq!(fold.test_indices, vec![i]);
            assert_eq!(fold.train_indices.len(), 7);
        }
    }

    #[test]
    fn test_same_seed_same_plan() {
        let y = balanced_labels(30);
        let planner = SplitPlanner::new(SplitStrategy::ShuffleSplit).with_random_state(5);
        assert_eq!(planner.plan(&y).unwrap(), planner.plan(&y).unwrap());
    }

    #[test]
    fn test_unknown_splitter() {
        let err = SplitStrategy::from_name("group_kfold").unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(
            SplitStrategy::from_name("leave_one_out").unwrap(),
            SplitStrategy::LeaveOneOut
        );
    }

    #[test]
    fn test_cv_results_skip_nan() {
        let results = CVResults::from_scores(vec![0.5, f64::NAN, 1.0]);
        assert_eq!(results.n_folds, 3);
        assert!((results.mean_score - 0.75).abs() < 1e-12);
    }
}
