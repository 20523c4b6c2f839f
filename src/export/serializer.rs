//! Run output persistence
//!
//! Writes the per-run output directory and the checksummed model blob.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ExseekError, Result};
use crate::evaluation::{EvaluationConfig, ResultBundle};
use crate::training::{Estimator, Method};
use crate::utils::Dataset;
use ndarray::Array2;
use tracing::info;

/// Model metadata stored next to the encoded estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Method name, used to pick the decoder on load
    pub method: String,
    pub feature_names: Vec<String>,
    /// Column indices of `feature_names` in the input matrix
    pub feature_indices: Vec<usize>,
    pub hyperparameters: Vec<(String, String)>,
}

impl ModelMetadata {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            feature_names: Vec::new(),
            feature_indices: Vec::new(),
            hyperparameters: Vec::new(),
        }
    }

    pub fn with_features(mut self, names: Vec<String>, indices: Vec<usize>) -> Self {
        self.feature_names = names;
        self.feature_indices = indices;
        self
    }

    pub fn add_hyperparameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hyperparameters.push((key.into(), value.into()));
        self
    }
}

/// Serializable model wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    pub magic: [u8; 4],
    pub format_version: u32,
    pub metadata: ModelMetadata,
    pub model_data: Vec<u8>,
    pub checksum: u64,
}

impl SerializedModel {
    const MAGIC: [u8; 4] = *b"EXSK";
    const VERSION: u32 = 1;

    pub fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    /// FNV-1a over the encoded estimator
    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        data.iter().fold(FNV_OFFSET, |hash, &byte| {
            (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
        })
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.model_data) == self.checksum
    }
}

/// Write a fitted estimator with its metadata
pub fn save_model(
    estimator: &dyn Estimator,
    metadata: ModelMetadata,
    path: impl AsRef<Path>,
) -> Result<()> {
    let serialized = SerializedModel::new(metadata, estimator.to_bytes()?);
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    bincode::serialize_into(&mut writer, &serialized)?;
    writer.flush()?;
    Ok(())
}

/// Restore an estimator written by [`save_model`]
pub fn load_model(path: impl AsRef<Path>) -> Result<(Box<dyn Estimator>, ModelMetadata)> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let serialized: SerializedModel = bincode::deserialize_from(reader)?;

    if serialized.magic != SerializedModel::MAGIC {
        return Err(ExseekError::SerializationError(
            "not an exseek model file".to_string(),
        ));
    }
    if serialized.format_version != SerializedModel::VERSION {
        return Err(ExseekError::SerializationError(format!(
            "unsupported model format version {}",
            serialized.format_version
        )));
    }
    if !serialized.verify_checksum() {
        return Err(ExseekError::SerializationError(
            "Checksum verification failed - file may be corrupted".to_string(),
        ));
    }

    let estimator = Method::from_name(&serialized.metadata.method)?.load(&serialized.model_data)?;
    Ok((estimator, serialized.metadata))
}

fn float_rows(matrix: &Array2<f64>) -> Value {
    Value::Array(
        matrix
            .rows()
            .into_iter()
            .map(|row| json!(row.iter().map(|v| v.is_finite().then_some(*v)).collect::<Vec<_>>()))
            .collect(),
    )
}

fn bool_rows(matrix: &Array2<bool>) -> Value {
    Value::Array(
        matrix
            .rows()
            .into_iter()
            .map(|row| json!(row.to_vec()))
            .collect(),
    )
}

/// Evaluation arrays keyed by strategy name
pub fn evaluation_archive(bundle: &ResultBundle) -> Value {
    let mut arrays = serde_json::Map::new();
    arrays.insert("train_index_matrix".into(), bool_rows(&bundle.train_index_matrix));
    arrays.insert("predictions".into(), float_rows(&bundle.predictions));
    arrays.insert("predicted_labels".into(), float_rows(&bundle.predicted_labels));
    arrays.insert(
        "labels".into(),
        json!(bundle.labels.iter().map(|&v| v as i64).collect::<Vec<_>>()),
    );
    if let Some(selection) = &bundle.feature_selection_matrix {
        arrays.insert("feature_selection_matrix".into(), bool_rows(selection));
    }
    if let (Some(steps), Some(scores)) = (&bundle.rfe_n_features_step, &bundle.rfe_scores) {
        arrays.insert("rfe_n_features_step".into(), json!(steps));
        arrays.insert("rfe_scores".into(), float_rows(scores));
    }

    let mut archive = serde_json::Map::new();
    archive.insert(bundle.strategy.clone(), Value::Object(arrays));
    Value::Object(archive)
}

fn format_score(score: f64) -> String {
    if score.is_nan() {
        "nan".to_string()
    } else {
        score.to_string()
    }
}

/// Tab-separated metrics table, one row per scored fold
pub fn metrics_table(bundle: &ResultBundle) -> String {
    let repeated = bundle.metrics.iter().any(|m| m.repeat.is_some());
    let with_test = bundle.metrics.iter().any(|m| m.test_score.is_some());

    let mut header = Vec::new();
    if repeated {
        header.push("repeat".to_string());
    }
    header.push("split".to_string());
    header.push(format!("train_{}", bundle.scorer));
    if with_test {
        header.push(format!("test_{}", bundle.scorer));
    }

    let mut out = header.join("\t");
    out.push('\n');
    for record in &bundle.metrics {
        let mut row = Vec::new();
        if let Some(repeat) = record.repeat {
            row.push(repeat.to_string());
        }
        row.push(record.split.to_string());
        row.push(format_score(record.train_score));
        if with_test {
            row.push(format_score(record.test_score.unwrap_or(f64::NAN)));
        }
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_lines<I, S>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line.as_ref())?;
    }
    writer.flush()?;
    Ok(())
}

/// Persist a finished run into `output_dir` and return the written paths
pub fn save_results(
    bundle: &ResultBundle,
    dataset: &Dataset,
    config: &EvaluationConfig,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let dir = output_dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join("samples.txt");
    write_lines(&path, &dataset.sample_ids)?;
    written.push(path);

    let path = dir.join("classes.txt");
    write_lines(&path, bundle.labels.iter().map(|&v| (v as i64).to_string()))?;
    written.push(path);

    let final_model = &bundle.final_model;
    let feature_names: Vec<String> = final_model
        .features
        .iter()
        .map(|&i| {
            dataset.feature_names.get(i).cloned().ok_or_else(|| ExseekError::ShapeError {
                expected: format!("feature index < {}", dataset.feature_names.len()),
                actual: i.to_string(),
            })
        })
        .collect::<Result<_>>()?;

    let metadata = final_model.estimator.params().into_iter().fold(
        ModelMetadata::new(final_model.estimator.name())
            .with_features(feature_names.clone(), final_model.features.clone()),
        |meta, (key, value)| meta.add_hyperparameter(key, value.to_string()),
    );
    let path = dir.join("best_model.bin");
    save_model(final_model.estimator.as_ref(), metadata, &path)?;
    written.push(path);

    let path = dir.join("features.txt");
    write_lines(
        &path,
        feature_names
            .iter()
            .zip(&final_model.features)
            .map(|(name, idx)| format!("{}\t{}", name, idx)),
    )?;
    written.push(path);

    let path = dir.join("feature_importances.txt");
    write_lines(
        &path,
        feature_names
            .iter()
            .zip(final_model.importances.iter())
            .map(|(name, importance)| format!("{}\t{}", name, importance)),
    )?;
    written.push(path);

    let path = dir.join(format!("evaluation.{}.json", bundle.strategy));
    write_json(&path, &evaluation_archive(bundle))?;
    written.push(path);

    let path = dir.join("metrics.txt");
    fs::write(&path, metrics_table(bundle))?;
    written.push(path);

    if let Some(score) = bundle.aggregate_test_score {
        let path = dir.join("aggregate_metrics.txt");
        fs::write(&path, format!("test_{}\n{}\n", bundle.scorer, format_score(score)))?;
        written.push(path);
    }

    let path = dir.join("config.json");
    config.save_json(&path)?;
    written.push(path);

    info!(output_dir = %dir.display(), n_files = written.len(), "results saved");
    Ok(written)
}
