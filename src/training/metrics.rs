//! Ranking metrics computed from true labels and continuous positive-class scores

use crate::error::{ExseekError, Result};
use ndarray::Array1;
use std::cmp::Ordering;

/// Scalar score from `(y_true, y_score)`, higher is better
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64>;
}

/// Area under the ROC curve
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAuc;

/// Area under the precision-recall curve, step-wise
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragePrecision;

/// Look up a metric by its registered name
pub fn from_name(name: &str) -> Result<Box<dyn Metric>> {
    match name {
        "roc_auc" => Ok(Box::new(RocAuc)),
        "average_precision" => Ok(Box::new(AveragePrecision)),
        other => Err(ExseekError::ConfigError(format!("unknown scorer: {}", other))),
    }
}

fn check_inputs(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<(usize, usize)> {
    if y_true.len() != y_score.len() {
        return Err(ExseekError::ShapeError {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", y_score.len()),
        });
    }
    if y_score.iter().any(|s| s.is_nan()) {
        return Err(ExseekError::ComputationError("scores contain NaN".to_string()));
    }
    let n_pos = y_true.iter().filter(|&&v| v > 0.5).count();
    Ok((n_pos, y_true.len() - n_pos))
}

/// Indices ordered by descending score
fn descending_order(y_score: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[b].partial_cmp(&y_score[a]).unwrap_or(Ordering::Equal));
    order
}

impl Metric for RocAuc {
    fn name(&self) -> &'static str {
        "roc_auc"
    }

    /// Mann-Whitney U statistic with average ranks for tied scores
    fn score(&self, y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
        let (n_pos, n_neg) = check_inputs(y_true, y_score)?;
        if n_pos == 0 || n_neg == 0 {
            return Err(ExseekError::ComputationError(
                "Only one class present in y_true. ROC AUC score is not defined in that case."
                    .to_string(),
            ));
        }

        let mut order = descending_order(y_score);
        order.reverse();

        let mut rank_sum_pos = 0.0;
        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && y_score[order[end]] == y_score[order[start]] {
                end += 1;
            }
            // ranks start..end (0-based) share their mean, 1-based
            let avg_rank = (start + end + 1) as f64 / 2.0;
            let tied_pos = order[start..end].iter().filter(|&&i| y_true[i] > 0.5).count();
            rank_sum_pos += avg_rank * tied_pos as f64;
            start = end;
        }

        let n_pos = n_pos as f64;
        let n_neg = n_neg as f64;
        let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
        Ok(u / (n_pos * n_neg))
    }
}

impl Metric for AveragePrecision {
    fn name(&self) -> &'static str {
        "average_precision"
    }

    /// Sum over distinct thresholds of `(R_k - R_{k-1}) * P_k`
    fn score(&self, y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
        let (n_pos, _) = check_inputs(y_true, y_score)?;
        if n_pos == 0 {
            return Err(ExseekError::ComputationError(
                "no positive samples in y_true, average precision is not defined".to_string(),
            ));
        }

        let order = descending_order(y_score);
        let mut tp = 0.0;
        let mut seen = 0.0;
        let mut prev_recall = 0.0;
        let mut ap = 0.0;

        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && y_score[order[end]] == y_score[order[start]] {
                end += 1;
            }
            for &i in &order[start..end] {
                if y_true[i] > 0.5 {
                    tp += 1.0;
                }
                seen += 1.0;
            }
            let recall = tp / n_pos as f64;
            ap += (recall - prev_recall) * (tp / seen);
            prev_recall = recall;
            start = end;
        }

        Ok(ap)
    }
}
