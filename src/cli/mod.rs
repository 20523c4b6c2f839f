//! exseek CLI Module
//!
//! Command-line interface for cross-validated evaluation and prediction.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::ExseekError;
use crate::evaluation::{self, EvaluationConfig};
use crate::export::{load_model, save_results};
use crate::training::positive_scores;
use crate::utils::DatasetLoader;
use ndarray::Axis;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
    let _ = std::io::stdout().flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<22} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "exseek")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated feature selection and evaluation of binary classifiers")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a classifier with cross-validated feature selection
    Evaluate(EvaluateArgs),

    /// Score a feature matrix with a saved model
    Predict {
        /// Model file written by `evaluate` (best_model.bin)
        #[arg(long)]
        model: PathBuf,

        /// Feature matrix, first column holds sample ids
        #[arg(short, long)]
        matrix: PathBuf,

        /// Output file, one `sample\tscore\tlabel` row per sample
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Options of the `evaluate` subcommand.
///
/// Options left out take their value from `--config` when given, otherwise
/// from [`EvaluationConfig::default`].
#[derive(Args, Debug, Clone, Default)]
pub struct EvaluateArgs {
    /// Feature matrix (samples x features), first column holds sample ids
    #[arg(short, long)]
    pub matrix: PathBuf,

    /// Two-column table of sample id and class
    #[arg(long)]
    pub sample_classes: PathBuf,

    /// Comma-separated classes labelled positive
    #[arg(long, value_delimiter = ',', requires = "negative_class")]
    pub positive_class: Option<Vec<String>>,

    /// Comma-separated classes labelled negative
    #[arg(long, value_delimiter = ',', requires = "positive_class")]
    pub negative_class: Option<Vec<String>>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// JSON configuration file; explicit options override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Classifier (logistic_regression, random_forest, linear_svm)
    #[arg(long)]
    pub method: Option<String>,

    /// Resampling strategy
    #[arg(long)]
    pub splitter: Option<String>,

    #[arg(long)]
    pub n_splits: Option<usize>,

    #[arg(long)]
    pub n_repeats: Option<usize>,

    #[arg(long)]
    pub test_size: Option<f64>,

    /// Metric (roc_auc, average_precision)
    #[arg(long)]
    pub scorer: Option<String>,

    /// Number of features to select
    #[arg(long)]
    pub n_select: Option<usize>,

    /// Select features by recursive elimination
    #[arg(long)]
    pub rfe: bool,

    /// Features removed per elimination step, a count or a fraction
    #[arg(long)]
    pub rfe_step: Option<f64>,

    /// Select features by stability across resampling runs
    #[arg(long)]
    pub robust_select: bool,

    /// Resampling for robust selection (jackknife, bootstrap)
    #[arg(long)]
    pub robust_resample_method: Option<String>,

    #[arg(long)]
    pub robust_max_runs: Option<usize>,

    /// Samples removed per jackknife run, a count or a fraction
    #[arg(long)]
    pub robust_jackknife_remove: Option<f64>,

    /// Use class-balanced sample weights
    #[arg(long)]
    pub compute_sample_weight: bool,

    /// Skip the per-fold grid search
    #[arg(long)]
    pub no_tune: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Evaluate folds and resampling runs concurrently
    #[arg(long)]
    pub parallel: bool,
}

impl EvaluateArgs {
    /// Resolve the run configuration from `--config` and the explicit options
    pub fn to_config(&self) -> crate::error::Result<EvaluationConfig> {
        let mut config = match &self.config {
            Some(path) => EvaluationConfig::from_json_file(path)?,
            None => EvaluationConfig::default(),
        };

        if let Some(method) = &self.method {
            config.method = method.clone();
        }
        if let Some(splitter) = &self.splitter {
            config.splitter = splitter.clone();
        }
        if let Some(n) = self.n_splits {
            config.n_splits = n;
        }
        if let Some(n) = self.n_repeats {
            config.n_repeats = n;
        }
        if let Some(size) = self.test_size {
            config.test_size = size;
        }
        if let Some(scorer) = &self.scorer {
            config.scorer = scorer.clone();
        }
        if self.n_select.is_some() {
            config.n_select = self.n_select;
        }
        config.rfe |= self.rfe;
        if let Some(step) = self.rfe_step {
            config.rfe_step = step;
        }
        config.robust_select |= self.robust_select;
        if let Some(method) = &self.robust_resample_method {
            config.robust_resample_method = method.clone();
        }
        if let Some(runs) = self.robust_max_runs {
            config.robust_max_runs = runs;
        }
        if let Some(remove) = self.robust_jackknife_remove {
            config.robust_jackknife_remove = remove;
        }
        config.compute_sample_weight |= self.compute_sample_weight;
        if self.no_tune {
            config.tune = false;
        }
        if let Some(seed) = self.seed {
            config.random_state = seed;
        }
        config.parallel |= self.parallel;

        config.validate()?;
        Ok(config)
    }

    fn loader(&self) -> DatasetLoader {
        match (&self.positive_class, &self.negative_class) {
            (Some(pos), Some(neg)) => DatasetLoader::new().with_classes(pos.clone(), neg.clone()),
            _ => DatasetLoader::new(),
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_evaluate(args: &EvaluateArgs) -> anyhow::Result<()> {
    section("Evaluate");

    // configuration errors surface before the matrix is read
    let config = args.to_config()?;

    step_run("Loading data");
    let start = Instant::now();
    let dataset = args.loader().load(&args.matrix, &args.sample_classes)?;
    step_done(&format!(
        "{} samples × {} features in {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        start.elapsed()
    ));

    step_run(&format!("Evaluating {} with {}", config.method.cyan(), config.splitter.cyan()));
    let start = Instant::now();
    let bundle = evaluation::evaluate(&dataset, &config)?;
    step_done(&format!("{} folds in {:?}", bundle.n_folds() - 1, start.elapsed()));

    step_run(&format!("Saving → {}", args.output_dir.display()));
    let written = save_results(&bundle, &dataset, &config, &args.output_dir)?;
    step_done(&format!("{} files", written.len()));

    println!();
    let summary = bundle.test_summary();
    if let Some(score) = bundle.aggregate_test_score {
        kv(&format!("test {}", bundle.scorer), &format!("{:.4}", score));
    } else if summary.n_folds > 0 {
        kv(
            &format!("test {}", bundle.scorer),
            &format!("{:.4} ± {:.4}", summary.mean_score, summary.std_score),
        );
    }
    kv("selected features", &bundle.final_model.features.len().to_string());
    println!();

    Ok(())
}

pub fn cmd_predict(model_path: &Path, matrix_path: &Path, output: &Path) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let (estimator, metadata) = load_model(model_path)?;
    step_done(&format!("{} on {} features", metadata.method, metadata.feature_names.len()));

    step_run("Loading data");
    let (x, sample_ids, feature_names) = DatasetLoader::new().load_matrix(matrix_path)?;
    step_done(&format!("{} samples × {} features", x.nrows(), x.ncols()));

    let columns: Vec<usize> = metadata
        .feature_names
        .iter()
        .map(|name| {
            feature_names
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| {
                    ExseekError::DataError(format!("feature {} not found in matrix", name))
                })
        })
        .collect::<crate::error::Result<_>>()?;
    let x = x.select(Axis(1), &columns);

    step_run("Scoring");
    let scores = positive_scores(estimator.as_ref(), &x)?;
    let labels = estimator.predict(&x)?;
    let mut out = String::from("sample\tscore\tlabel\n");
    for ((id, score), label) in sample_ids.iter().zip(scores.iter()).zip(labels.iter()) {
        out.push_str(&format!("{}\t{}\t{}\n", id, score, *label as i64));
    }
    std::fs::write(output, out)?;
    step_done(&output.display().to_string());
    println!();

    Ok(())
}
