//! Linear classifiers: logistic regression and linear SVM
//!
//! Both minimise a sample-weighted loss plus an L2 penalty scaled by `1 / C`,
//! so a larger `C` means weaker regularization. The intercept is not penalised.

use crate::error::{ExseekError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::models::{
    check_fit_input, Capabilities, Estimator, ImportanceMethod, ParamValue, ScoreMethod,
};

/// Upper bound on the largest eigenvalue of `X^T diag(w) X / W`
fn weighted_trace_bound(x: &Array2<f64>, sample_weight: &Array1<f64>, total_weight: f64) -> f64 {
    x.rows()
        .into_iter()
        .zip(sample_weight.iter())
        .map(|(row, &w)| w * (row.dot(&row) + 1.0))
        .sum::<f64>()
        / total_weight
}

fn total_weight(sample_weight: &Array1<f64>) -> Result<f64> {
    let total = sample_weight.sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(ExseekError::FitError(format!(
            "sample weights must sum to a positive value, got {}",
            total
        )));
    }
    Ok(total)
}

fn set_c(c: &mut f64, value: &ParamValue) -> Result<()> {
    let v = value.as_f64();
    if v <= 0.0 {
        return Err(ExseekError::InvalidParameter {
            name: "C".to_string(),
            value: v.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    *c = v;
    Ok(())
}

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Fraction of the stable step size taken per iteration
    pub learning_rate: f64,
    /// Whether model is fitted
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 1.0,
            is_fitted: false,
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn linear(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ExseekError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(ExseekError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            score: Some(ScoreMethod::PredictProba),
            importance: Some(ImportanceMethod::Coefficients),
        }
    }

    /// Fit using full-batch gradient descent
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y, sample_weight)?;
        let total = total_weight(sample_weight)?;
        let penalty = 1.0 / (self.c * total);

        let lipschitz = 0.25 * weighted_trace_bound(x, sample_weight, total) + penalty;
        let lr = self.learning_rate / lipschitz;

        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = (&predictions - y) * sample_weight;
            let dw = x.t().dot(&errors) / total + penalty * &weights;
            let db = errors.sum() / total;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if weights.iter().any(|v: &f64| !v.is_finite()) {
            return Err(ExseekError::FitError(
                "logistic regression diverged".to_string(),
            ));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Probability of the positive class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Self::sigmoid(&self.linear(x)?))
    }

    fn coefficients(&self) -> Result<Array1<f64>> {
        self.coefficients.clone().ok_or(ExseekError::ModelNotFitted)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => set_c(&mut self.c, value),
            "max_iter" => {
                self.max_iter = value.as_usize();
                Ok(())
            }
            _ => Err(ExseekError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: "not a logistic_regression parameter".to_string(),
            }),
        }
    }

    fn params(&self) -> Vec<(String, ParamValue)> {
        vec![
            ("C".to_string(), ParamValue::Float(self.c)),
            ("max_iter".to_string(), ParamValue::Int(self.max_iter)),
        ]
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

/// Linear support vector classifier with a squared hinge loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    pub is_fitted: bool,
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSvm {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 1.0,
            is_fitted: false,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

impl Estimator for LinearSvm {
    fn name(&self) -> &'static str {
        "linear_svm"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            score: Some(ScoreMethod::DecisionFunction),
            importance: Some(ImportanceMethod::Coefficients),
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y, sample_weight)?;
        let total = total_weight(sample_weight)?;
        let penalty = 1.0 / (self.c * total);

        let lipschitz = 2.0 * weighted_trace_bound(x, sample_weight, total) + penalty;
        let lr = self.learning_rate / lipschitz;

        // {0, 1} -> {-1, +1}
        let signs = y.mapv(|v| if v > 0.5 { 1.0 } else { -1.0 });
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _iter in 0..self.max_iter {
            let margins = (x.dot(&weights) + bias) * &signs;
            // d/df of max(0, 1 - t f)^2 is -2 t max(0, 1 - t f)
            let slack = margins.mapv(|m| (1.0 - m).max(0.0));
            let coef = -2.0 * &slack * &signs * sample_weight;

            let dw = x.t().dot(&coef) / total + penalty * &weights;
            let db = coef.sum() / total;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if weights.iter().any(|v: &f64| !v.is_finite()) {
            return Err(ExseekError::FitError("linear SVM diverged".to_string()));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores.mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }))
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ExseekError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(ExseekError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn coefficients(&self) -> Result<Array1<f64>> {
        self.coefficients.clone().ok_or(ExseekError::ModelNotFitted)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => set_c(&mut self.c, value),
            "max_iter" => {
                self.max_iter = value.as_usize();
                Ok(())
            }
            _ => Err(ExseekError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: "not a linear_svm parameter".to_string(),
            }),
        }
    }

    fn params(&self) -> Vec<(String, ParamValue)> {
        vec![
            ("C".to_string(), ParamValue::Float(self.c)),
            ("max_iter".to_string(), ParamValue::Int(self.max_iter)),
        ]
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [-2.5, -2.0],
            [-2.0, -2.5],
            [-1.5, -1.0],
            [1.5, 1.0],
            [2.0, 2.5],
            [2.5, 2.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_logistic_regression() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new().with_c(100.0).with_max_iter(2000);
        model.fit(&x, &y, &Array1::ones(6)).unwrap();
        assert!(model.is_fitted);

        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy should be >= 0.8, got {}", accuracy);
    }

    #[test]
    fn test_predict_proba_orders_samples() {
        let x = array![[0.0, 0.0], [10.0, 10.0]];
        let y = array![0.0, 1.0];

        let mut model = LogisticRegression::new().with_max_iter(500);
        model.fit(&x, &y, &Array1::ones(2)).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5);
        assert!(proba[1] > 0.5);
    }

    #[test]
    fn test_strong_regularization_shrinks_coefficients() {
        let (x, y) = separable();
        let w = Array1::ones(6);

        let mut weak = LogisticRegression::new().with_c(1e3);
        weak.fit(&x, &y, &w).unwrap();
        let mut strong = LogisticRegression::new().with_c(1e-5);
        strong.fit(&x, &y, &w).unwrap();

        let norm = |m: &LogisticRegression| m.coefficients().unwrap().mapv(|v| v * v).sum();
        assert!(norm(&strong) < norm(&weak));
    }

    #[test]
    fn test_unfitted_model_errors() {
        let model = LogisticRegression::new();
        let x = array![[1.0, 2.0]];
        assert!(matches!(model.predict_proba(&x), Err(ExseekError::ModelNotFitted)));
        assert!(matches!(model.decision_function(&x), Err(ExseekError::CapabilityError(_))));
    }

    #[test]
    fn test_set_param() {
        let mut model = LogisticRegression::new();
        model.set_param("C", &ParamValue::Float(0.01)).unwrap();
        assert_eq!(model.c, 0.01);
        assert!(model.set_param("C", &ParamValue::Float(-1.0)).is_err());
        assert!(model.set_param("n_estimators", &ParamValue::Int(10)).is_err());
    }

    #[test]
    fn test_linear_svm() {
        let (x, y) = separable();
        let mut model = LinearSvm::new().with_c(10.0);
        model.fit(&x, &y, &Array1::ones(6)).unwrap();

        let scores = model.decision_function(&x).unwrap();
        assert!(scores[0] < scores[5]);
        let accuracy = model.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy should be >= 0.8, got {}", accuracy);
        assert!(matches!(model.predict_proba(&x), Err(ExseekError::CapabilityError(_))));
    }

    #[test]
    fn test_sample_weight_shifts_decision() {
        // overlapping points; up-weighting the positive one pulls the boundary
        let x = array![[0.0], [0.0], [1.0], [1.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut uniform = LogisticRegression::new();
        uniform.fit(&x, &y, &Array1::ones(4)).unwrap();
        let mut weighted = LogisticRegression::new();
        weighted.fit(&x, &y, &array![1.0, 5.0, 1.0, 5.0]).unwrap();

        let p_uniform = uniform.predict_proba(&x).unwrap();
        let p_weighted = weighted.predict_proba(&x).unwrap();
        assert!(p_weighted[0] > p_uniform[0]);
    }
}
