//! Hyperparameter tuning
//!
//! Grid search over a method's parameter grid, re-run independently inside
//! every outer fold on that fold's training partition.

pub mod grid_search;

pub use grid_search::{HyperparameterTuner, Study, TrialParams, TrialResult};
