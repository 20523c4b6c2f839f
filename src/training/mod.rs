//! Estimators, resampling and metrics
//!
//! Provides the classifier side of an evaluation run:
//! - the `Estimator` trait with declared scoring and importance paths
//! - logistic regression, linear SVM and random forest classifiers
//! - train/test split planning (k-fold family, shuffle-split family, leave-one-out)
//! - ranking metrics (ROC AUC, average precision)

mod models;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod metrics;

pub use models::{
    compute_sample_weight, feature_importances, positive_scores, Capabilities, Estimator,
    ImportanceMethod, Method, ParamValue, ScoreMethod,
};
pub(crate) use models::check_fit_input;
pub use cross_validation::{CVResults, Fold, SplitPlanner, SplitStrategy};
pub use linear_models::{LinearSvm, LogisticRegression};
pub use decision_tree::{DecisionTree, TreeNode};
pub use random_forest::RandomForest;
pub use metrics::{AveragePrecision, Metric, RocAuc};
