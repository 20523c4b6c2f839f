//! Persisted run outputs
//!
//! One output directory per run:
//! - `samples.txt`, `classes.txt`: sample ids and integer labels, aligned to prediction columns
//! - `best_model.bin`: checksummed, bincode-encoded final estimator
//! - `features.txt`, `feature_importances.txt`: selected features of the final model
//! - `evaluation.<strategy>.json`: fold-indexed arrays, NaN written as `null`
//! - `metrics.txt` and, for leave-one-out, `aggregate_metrics.txt`
//! - `config.json`: the resolved run configuration

mod serializer;

pub use serializer::{
    evaluation_archive, load_model, metrics_table, save_model, save_results, ModelMetadata,
    SerializedModel,
};
