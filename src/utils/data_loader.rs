//! Feature matrix and sample class loading

use crate::error::{ExseekError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Two-class dataset aligned by sample row
#[derive(Debug, Clone)]
pub struct Dataset {
    /// n_samples x n_features, may contain NaN
    pub x: Array2<f64>,
    /// 1 = positive class
    pub y: Array1<f64>,
    pub sample_ids: Vec<String>,
    pub feature_names: Vec<String>,
    pub positive_class: Vec<String>,
    pub negative_class: Vec<String>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_positive(&self) -> usize {
        self.y.iter().filter(|&&v| v > 0.5).count()
    }

    pub fn has_nan(&self) -> bool {
        self.x.iter().any(|v| v.is_nan())
    }
}

/// Loads a feature matrix and restricts it to two sample classes
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    separator: u8,
    positive_class: Option<Vec<String>>,
    negative_class: Option<Vec<String>>,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            separator: b'\t',
            positive_class: None,
            negative_class: None,
        }
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Explicit class lists; without them the two classes are inferred
    pub fn with_classes(mut self, positive: Vec<String>, negative: Vec<String>) -> Self {
        self.positive_class = Some(positive);
        self.negative_class = Some(negative);
        self
    }

    fn read_table(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            ExseekError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default().with_separator(self.separator);
        let reader = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file);

        Ok(reader.finish()?)
    }

    fn string_column(series: &Series) -> Result<Vec<String>> {
        let strings = series.cast(&DataType::String)?;
        Ok(strings
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect())
    }

    /// Read a matrix whose first column holds sample ids; returns the
    /// matrix with its sample ids and feature names
    pub fn load_matrix(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(Array2<f64>, Vec<String>, Vec<String>)> {
        let start = Instant::now();
        let path = path.as_ref();
        info!(path = %path.display(), "read feature matrix");
        let df = self.read_table(path)?;
        if df.width() < 2 {
            return Err(ExseekError::DataError(format!(
                "{} needs a sample id column and at least one feature column",
                path.display()
            )));
        }

        let columns = df.get_columns();
        let sample_ids = Self::string_column(&columns[0])?;
        let feature_names: Vec<String> =
            columns[1..].iter().map(|s| s.name().to_string()).collect();

        // Collect all columns as contiguous f64 Vecs; missing cells become NaN
        let col_data: Vec<Vec<f64>> = columns[1..]
            .iter()
            .map(|series| -> Result<Vec<f64>> {
                let values = series.cast(&DataType::Float64)?;
                Ok(values
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect())
            })
            .collect::<Result<_>>()?;
        let x = Array2::from_shape_fn((df.height(), col_data.len()), |(r, c)| col_data[c][r]);
        info!(
            n_samples = x.nrows(),
            n_features = x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "feature matrix loaded"
        );
        Ok((x, sample_ids, feature_names))
    }

    /// Read a feature matrix and a two-column sample-to-class table
    pub fn load(
        &self,
        matrix_path: impl AsRef<Path>,
        classes_path: impl AsRef<Path>,
    ) -> Result<Dataset> {
        let (x, sample_ids, feature_names) = self.load_matrix(matrix_path)?;

        let classes_path = classes_path.as_ref();
        info!(path = %classes_path.display(), "read sample classes");
        let class_df = self.read_table(classes_path)?;
        if class_df.width() < 2 {
            return Err(ExseekError::DataError(format!(
                "{} needs a sample id column and a class column",
                classes_path.display()
            )));
        }
        let class_columns = class_df.get_columns();
        let sample_classes: HashMap<String, String> = Self::string_column(&class_columns[0])?
            .into_iter()
            .zip(Self::string_column(&class_columns[1])?)
            .collect();

        self.from_parts(x, sample_ids, feature_names, &sample_classes)
    }

    /// Restrict an in-memory matrix to the configured classes
    pub fn from_parts(
        &self,
        x: Array2<f64>,
        sample_ids: Vec<String>,
        feature_names: Vec<String>,
        sample_classes: &HashMap<String, String>,
    ) -> Result<Dataset> {
        if sample_ids.len() != x.nrows() || feature_names.len() != x.ncols() {
            return Err(ExseekError::ShapeError {
                expected: format!("{} sample ids and {} feature names", x.nrows(), x.ncols()),
                actual: format!("{} and {}", sample_ids.len(), feature_names.len()),
            });
        }

        let classes: Vec<&str> = sample_ids
            .iter()
            .map(|id| {
                sample_classes
                    .get(id)
                    .map(String::as_str)
                    .ok_or_else(|| ExseekError::DataError(format!("sample {} has no class", id)))
            })
            .collect::<Result<_>>()?;

        let (positive_class, negative_class) = match (&self.positive_class, &self.negative_class) {
            (Some(pos), Some(neg)) => (pos.clone(), neg.clone()),
            (None, None) => {
                let mut unique: Vec<&str> = classes.clone();
                unique.sort_unstable();
                unique.dedup();
                if unique.len() != 2 {
                    return Err(ExseekError::DataError(format!(
                        "expect 2 classes but {} classes found",
                        unique.len()
                    )));
                }
                (vec![unique[0].to_string()], vec![unique[1].to_string()])
            }
            _ => {
                return Err(ExseekError::ConfigError(
                    "positive and negative classes must be given together".to_string(),
                ))
            }
        };
        info!(positive = ?positive_class, negative = ?negative_class, "class assignment");

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (row, class) in classes.iter().enumerate() {
            if positive_class.iter().any(|c| c.as_str() == *class) {
                rows.push(row);
                labels.push(1.0);
            } else if negative_class.iter().any(|c| c.as_str() == *class) {
                rows.push(row);
                labels.push(0.0);
            }
        }

        let y = Array1::from_vec(labels);
        let n_pos = y.iter().filter(|&&v| v > 0.5).count();
        let n_neg = y.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(ExseekError::DataError(format!(
                "both classes need samples, got {} positive and {} negative",
                n_pos, n_neg
            )));
        }
        info!(
            n_positive = n_pos,
            n_negative = n_neg,
            class_ratio = n_pos as f64 / n_neg as f64,
            "samples selected"
        );

        let dataset = Dataset {
            x: x.select(Axis(0), &rows),
            y,
            sample_ids: rows.iter().map(|&r| sample_ids[r].clone()).collect(),
            feature_names,
            positive_class,
            negative_class,
        };
        if dataset.has_nan() {
            warn!("nan values found in features");
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn parts() -> (Array2<f64>, Vec<String>, Vec<String>, HashMap<String, String>) {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]];
        let ids: Vec<String> = ["s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect();
        let features = vec!["g1".to_string(), "g2".to_string()];
        let pairs = [("s1", "normal"), ("s2", "tumor"), ("s3", "tumor"), ("s4", "other")];
        let classes: HashMap<String, String> = pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        (x, ids, features, classes)
    }

    #[test]
    fn test_inferred_classes_need_exactly_two() {
        let (x, ids, features, classes) = parts();
        let err = DatasetLoader::new().from_parts(x, ids, features, &classes).unwrap_err();
        assert_eq!(err.to_string(), "Data error: expect 2 classes but 3 classes found");
    }

    #[test]
    fn test_explicit_classes_filter_rows_in_order() {
        let (x, ids, features, classes) = parts();
        let dataset = DatasetLoader::new()
            .with_classes(vec!["tumor".into()], vec!["normal".into()])
            .from_parts(x, ids, features, &classes)
            .unwrap();
        assert_eq!(dataset.sample_ids, vec!["s1", "s2", "s3"]);
        assert_eq!(dataset.y, array![0.0, 1.0, 1.0]);
        assert_eq!(dataset.x.row(2), array![5.0, 6.0].view());
        assert_eq!(dataset.n_positive(), 2);
    }

    #[test]
    fn test_unknown_sample_is_a_data_error() {
        let (x, ids, features, mut classes) = parts();
        classes.remove("s2");
        let err = DatasetLoader::new()
            .with_classes(vec!["tumor".into()], vec!["normal".into()])
            .from_parts(x, ids, features, &classes)
            .unwrap_err();
        assert!(matches!(err, ExseekError::DataError(_)));
    }
}
