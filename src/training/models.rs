//! Estimator trait, capability declarations and the method dispatch table

use crate::error::{ExseekError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::linear_models::{LinearSvm, LogisticRegression};
use super::random_forest::RandomForest;

/// How an estimator produces a continuous positive-class score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMethod {
    /// Probability of the positive class
    PredictProba,
    /// Signed distance to the separating hyperplane
    DecisionFunction,
}

/// Where an estimator's per-feature importance comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceMethod {
    /// Linear model coefficients
    Coefficients,
    /// Impurity-based ensemble importances
    FeatureImportances,
}

/// Capabilities an estimator declares up front.
///
/// Each slot holds at most one path, so a declared capability is always unambiguous.
/// A missing slot surfaces as [`ExseekError::CapabilityError`] the first time a fold needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub score: Option<ScoreMethod>,
    pub importance: Option<ImportanceMethod>,
}

impl Capabilities {
    pub fn score_method(&self, estimator: &str) -> Result<ScoreMethod> {
        self.score.ok_or_else(|| {
            ExseekError::CapabilityError(format!(
                "{} should either provide decision_function() or predict_proba()",
                estimator
            ))
        })
    }

    pub fn importance_method(&self, estimator: &str) -> Result<ImportanceMethod> {
        self.importance.ok_or_else(|| {
            ExseekError::CapabilityError(format!(
                "{} should provide either coefficients or feature importances",
                estimator
            ))
        })
    }
}

/// Hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(usize),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f64,
        }
    }

    pub fn as_usize(&self) -> usize {
        match self {
            ParamValue::Float(v) => v.round().max(0.0) as usize,
            ParamValue::Int(v) => *v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Binary classifier used by the evaluation engine.
///
/// Labels are 0/1 encoded as `f64`, sample weights are always supplied
/// (uniform weights when no rebalancing is requested).
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Registered method name
    fn name(&self) -> &'static str;

    /// Declared scoring and importance paths
    fn capabilities(&self) -> Capabilities;

    /// Fit on `(x, y)` with per-sample weights
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: &Array1<f64>) -> Result<()>;

    /// Hard 0/1 labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(ExseekError::CapabilityError(format!(
            "{} does not implement predict_proba()",
            self.name()
        )))
    }

    fn decision_function(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(ExseekError::CapabilityError(format!(
            "{} does not implement decision_function()",
            self.name()
        )))
    }

    fn coefficients(&self) -> Result<Array1<f64>> {
        Err(ExseekError::CapabilityError(format!(
            "{} has no coefficients",
            self.name()
        )))
    }

    fn feature_importances(&self) -> Result<Array1<f64>> {
        Err(ExseekError::CapabilityError(format!(
            "{} has no feature importances",
            self.name()
        )))
    }

    /// Set a hyperparameter by name
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Current hyperparameters, in a stable order
    fn params(&self) -> Vec<(String, ParamValue)>;

    /// Mean accuracy on `(x, y)`, the default score used during grid search
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        if y.is_empty() {
            return Err(ExseekError::ComputationError(
                "cannot score an empty partition".to_string(),
            ));
        }
        let y_pred = self.predict(x)?;
        let correct = y_pred
            .iter()
            .zip(y.iter())
            .filter(|(pred, actual)| (*pred - *actual).abs() < 0.5)
            .count();
        Ok(correct as f64 / y.len() as f64)
    }

    /// Encode the fitted model as an opaque blob
    fn to_bytes(&self) -> Result<Vec<u8>>;

    fn clone_box(&self) -> Box<dyn Estimator>;
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Continuous positive-class score through the estimator's declared scoring path
pub fn positive_scores(estimator: &dyn Estimator, x: &Array2<f64>) -> Result<Array1<f64>> {
    match estimator.capabilities().score_method(estimator.name())? {
        ScoreMethod::PredictProba => estimator.predict_proba(x),
        ScoreMethod::DecisionFunction => estimator.decision_function(x),
    }
}

/// Signed per-feature importance through the estimator's declared importance path
pub fn feature_importances(estimator: &dyn Estimator) -> Result<Array1<f64>> {
    match estimator.capabilities().importance_method(estimator.name())? {
        ImportanceMethod::Coefficients => estimator.coefficients(),
        ImportanceMethod::FeatureImportances => estimator.feature_importances(),
    }
}

/// Per-sample weights for a training partition
pub fn compute_sample_weight(y: &Array1<f64>, balanced: bool) -> Array1<f64> {
    let n = y.len();
    if !balanced || n == 0 {
        return Array1::ones(n);
    }
    let n_pos = y.iter().filter(|&&v| v > 0.5).count();
    let n_neg = n - n_pos;
    let n_classes = [n_pos, n_neg].iter().filter(|&&c| c > 0).count() as f64;
    let w_pos = if n_pos > 0 { n as f64 / (n_classes * n_pos as f64) } else { 0.0 };
    let w_neg = if n_neg > 0 { n as f64 / (n_classes * n_neg as f64) } else { 0.0 };
    y.mapv(|v| if v > 0.5 { w_pos } else { w_neg })
}

/// Reject non-finite inputs before an estimator starts iterating
pub(crate) fn check_fit_input(
    name: &str,
    x: &Array2<f64>,
    y: &Array1<f64>,
    sample_weight: &Array1<f64>,
) -> Result<()> {
    let n_samples = x.nrows();
    if n_samples != y.len() || n_samples != sample_weight.len() {
        return Err(ExseekError::ShapeError {
            expected: format!("y and sample_weight length = {}", n_samples),
            actual: format!("y = {}, sample_weight = {}", y.len(), sample_weight.len()),
        });
    }
    if n_samples == 0 || x.ncols() == 0 {
        return Err(ExseekError::FitError(format!(
            "{} cannot be fitted on an empty matrix ({} x {})",
            name,
            n_samples,
            x.ncols()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ExseekError::FitError(format!(
            "{}: input contains NaN or infinity",
            name
        )));
    }
    Ok(())
}

/// Statically known classifier methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    LogisticRegression,
    RandomForest,
    LinearSvm,
}

const C_GRID: [f64; 10] = [1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1.0, 1e2, 1e3, 1e4, 1e5];

impl Method {
    pub const ALL: [Method; 3] = [
        Method::LogisticRegression,
        Method::RandomForest,
        Method::LinearSvm,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == name)
            .ok_or_else(|| {
                ExseekError::ConfigError(format!("unknown feature selection method: {}", name))
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::LogisticRegression => "logistic_regression",
            Method::RandomForest => "random_forest",
            Method::LinearSvm => "linear_svm",
        }
    }

    /// Fresh, unfitted estimator for this method
    pub fn build(&self, random_state: u64) -> Box<dyn Estimator> {
        match self {
            Method::LogisticRegression => Box::new(LogisticRegression::new()),
            Method::RandomForest => {
                Box::new(RandomForest::new(100).with_random_state(random_state))
            }
            Method::LinearSvm => Box::new(LinearSvm::new()),
        }
    }

    /// Hyperparameter grid searched inside every fold
    pub fn param_grid(&self) -> Vec<(String, Vec<ParamValue>)> {
        match self {
            Method::LogisticRegression | Method::LinearSvm => vec![(
                "C".to_string(),
                C_GRID.iter().map(|&c| ParamValue::Float(c)).collect(),
            )],
            Method::RandomForest => vec![
                (
                    "n_estimators".to_string(),
                    [25, 50, 75].iter().map(|&n| ParamValue::Int(n)).collect(),
                ),
                (
                    "max_depth".to_string(),
                    (2..8).map(ParamValue::Int).collect(),
                ),
            ],
        }
    }

    /// Restore a fitted estimator from [`Estimator::to_bytes`] output
    pub fn load(&self, bytes: &[u8]) -> Result<Box<dyn Estimator>> {
        Ok(match self {
            Method::LogisticRegression => {
                Box::new(bincode::deserialize::<LogisticRegression>(bytes)?)
            }
            Method::RandomForest => Box::new(bincode::deserialize::<RandomForest>(bytes)?),
            Method::LinearSvm => Box::new(bincode::deserialize::<LinearSvm>(bytes)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_method_dispatch_table() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()).unwrap(), method);
            let est = method.build(0);
            assert_eq!(est.name(), method.name());
        }
        let err = Method::from_name("xgboost").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_declared_capabilities() {
        let lr = Method::LogisticRegression.build(0).capabilities();
        assert_eq!(lr.score, Some(ScoreMethod::PredictProba));
        assert_eq!(lr.importance, Some(ImportanceMethod::Coefficients));

        let rf = Method::RandomForest.build(0).capabilities();
        assert_eq!(rf.importance, Some(ImportanceMethod::FeatureImportances));

        let svm = Method::LinearSvm.build(0).capabilities();
        assert_eq!(svm.score, Some(ScoreMethod::DecisionFunction));
    }

    #[test]
    fn test_missing_capability_is_reported() {
        let caps = Capabilities { score: None, importance: None };
        assert!(matches!(caps.score_method("dummy"), Err(ExseekError::CapabilityError(_))));
        assert!(matches!(caps.importance_method("dummy"), Err(ExseekError::CapabilityError(_))));
    }

    #[test]
    fn test_even_score_is_labelled_negative() {
        // constant features leave every probability at exactly 0.5
        let x = Array2::zeros((4, 2));
        let y = array![0.0, 1.0, 0.0, 1.0];
        let w = Array1::ones(4);

        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y, &w).unwrap();
        let mut rf = RandomForest::new(5).with_bootstrap(false);
        rf.fit(&x, &y, &w).unwrap();

        for model in [&lr as &dyn Estimator, &rf] {
            let proba = model.predict_proba(&x).unwrap();
            assert!(proba.iter().all(|&p| p == 0.5), "{}: {:?}", model.name(), proba);
            assert_eq!(model.predict(&x).unwrap(), Array1::<f64>::zeros(4));
        }
    }

    #[test]
    fn test_balanced_sample_weight() {
        let y = array![1.0, 0.0, 0.0, 0.0];
        let w = compute_sample_weight(&y, true);
        assert!((w[0] - 2.0).abs() < 1e-12);
        assert!((w[1] - 4.0 / 6.0).abs() < 1e-12);
        // total weight equals number of samples
        assert!((w.sum() - 4.0).abs() < 1e-12);

        let uniform = compute_sample_weight(&y, false);
        assert!(uniform.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_param_grids() {
        assert_eq!(Method::LogisticRegression.param_grid()[0].1.len(), 10);
        let rf = Method::RandomForest.param_grid();
        assert_eq!(rf[0].1.len() * rf[1].1.len(), 18);
    }

    #[test]
    fn test_nan_input_is_a_fit_error() {
        let x = array![[1.0, f64::NAN], [0.0, 1.0]];
        let y = array![0.0, 1.0];
        let w = Array1::ones(2);
        let err = check_fit_input("test", &x, &y, &w).unwrap_err();
        assert!(matches!(err, ExseekError::FitError(_)));
    }
}
