//! Cross-validated feature selection and evaluation
//!
//! A run plans its folds, evaluates each fold independently against the
//! shared matrix and labels, and collects the outcomes into a
//! [`ResultBundle`]. Nothing is persisted here; see [`crate::export`].

pub mod config;
pub mod fold;
pub mod results;

pub use config::EvaluationConfig;
pub use fold::{FoldEvaluator, FoldOutcome};
pub use results::{FinalModel, MetricRecord, ResultAggregator, ResultBundle};

use crate::error::Result;
use crate::optimizer::HyperparameterTuner;
use crate::utils::Dataset;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

/// Run a full evaluation of `dataset` under `config`
pub fn evaluate(dataset: &Dataset, config: &EvaluationConfig) -> Result<ResultBundle> {
    let start = Instant::now();

    // every name and option is checked before any model work
    config.validate()?;
    let method = config.method()?;
    let metric = config.metric()?;
    let planner = config.planner()?;
    let selector = config.selector(dataset.n_features())?;

    if dataset.has_nan() {
        warn!("feature matrix contains NaN values, estimators will reject them at fit time");
    }

    let folds = planner.plan(&dataset.y)?;
    info!(
        method = method.name(),
        splitter = %planner.strategy(),
        n_folds = folds.len() - 1,
        n_samples = dataset.n_samples(),
        n_features = dataset.n_features(),
        n_select = ?config.n_select,
        "start evaluation"
    );

    let tuner = config.tune.then(|| {
        HyperparameterTuner::new(method.param_grid())
            .with_n_folds(config.inner_cv_folds)
            .with_parallel(config.parallel)
    });
    let evaluator = FoldEvaluator::new(&dataset.x, &dataset.y, method, metric.as_ref())
        .with_tuner(tuner)
        .with_selector(selector)
        .with_balanced_weights(config.compute_sample_weight)
        .with_leave_one_out(planner.strategy().is_leave_one_out())
        .with_random_state(config.random_state);

    let outcomes: Vec<FoldOutcome> = if config.parallel {
        folds.par_iter().map(|fold| evaluator.evaluate(fold)).collect::<Result<_>>()?
    } else {
        folds.iter().map(|fold| evaluator.evaluate(fold)).collect::<Result<_>>()?
    };

    let mut aggregator = ResultAggregator::new(
        &planner,
        metric.as_ref(),
        dataset.y.clone(),
        dataset.n_features(),
        config.selection_active(),
        config.rfe_active(),
    );
    for outcome in outcomes {
        aggregator.record(outcome)?;
    }
    let bundle = aggregator.finish()?;

    let summary = bundle.test_summary();
    info!(
        mean_test_score = summary.mean_score,
        std_test_score = summary.std_score,
        aggregate_test_score = ?bundle.aggregate_test_score,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "evaluation finished"
    );
    Ok(bundle)
}
