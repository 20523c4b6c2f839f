//! exseek - Cross-validated feature selection for binary classifiers
//!
//! This crate evaluates a binary classifier on a samples × features matrix
//! under a chosen resampling strategy, selecting features inside every fold:
//! - Fold planning over seven resampling strategies
//! - Per-fold grid search, feature selection and refit
//! - Recursive elimination and resampling-stability selection
//! - Fold-indexed result arrays and persisted run outputs
//!
//! # Modules
//!
//! - [`utils`] - Matrix and sample class loading
//! - [`training`] - Estimators, fold planning and metrics
//! - [`optimizer`] - Per-fold hyperparameter grid search
//! - [`selection`] - Feature selectors
//! - [`evaluation`] - Run configuration, fold evaluation and result aggregation
//! - [`export`] - Persisted outputs and model files
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod training;
pub mod optimizer;
pub mod selection;
pub mod evaluation;

// Utilities
pub mod export;
pub mod utils;

// Services
pub mod cli;

pub use error::{ExseekError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ExseekError, Result};

    // Data
    pub use crate::utils::{Dataset, DatasetLoader};

    // Training
    pub use crate::training::{Estimator, Method, Metric, SplitPlanner, SplitStrategy};

    // Selection
    pub use crate::selection::{FeatureSelector, SelectionResult};

    // Evaluation
    pub use crate::evaluation::{evaluate, EvaluationConfig, ResultBundle};

    // Export
    pub use crate::export::{load_model, save_results};
}
