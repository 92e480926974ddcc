//! Logistic regression trained by batch gradient descent

use super::models::{Configurable, Estimator, TrainedModel};
use super::params::{self, ParamValue};
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

const TYPE_NAME: &str = "LogisticRegression";

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Inverse of L2 regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
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
            fit_intercept: true,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
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

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Predict probabilities of the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(AutoMlError::ModelNotFitted)?;

        if x.ncols() != coefficients.len() {
            return Err(AutoMlError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let linear = x.dot(coefficients) + self.intercept.unwrap_or(0.0);
        Ok(Self::sigmoid(&linear))
    }
}

impl Configurable for LogisticRegression {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "C" => self.c = params::positive_f64(TYPE_NAME, name, value)?,
            "max_iter" => self.max_iter = params::usize_value(TYPE_NAME, name, value)?,
            "learning_rate" => self.learning_rate = params::positive_f64(TYPE_NAME, name, value)?,
            "tol" => self.tol = params::positive_f64(TYPE_NAME, name, value)?,
            "fit_intercept" => self.fit_intercept = params::bool_value(TYPE_NAME, name, value)?,
            _ => return Err(params::unknown_property(TYPE_NAME, name)),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "C" => Some(self.c.into()),
            "max_iter" => Some(self.max_iter.into()),
            "learning_rate" => Some(self.learning_rate.into()),
            "tol" => Some(self.tol.into()),
            "fit_intercept" => Some(self.fit_intercept.into()),
            _ => None,
        }
    }
}

impl Estimator for LogisticRegression {
    /// Fit by gradient descent on the mean log-loss plus `||w||^2 / (2 C n)`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(AutoMlError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(AutoMlError::ValidationError(
                "cannot fit logistic regression on zero samples".to_string(),
            ));
        }

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        let lr = self.learning_rate;
        let alpha = 1.0 / (self.c * n_samples as f64);

        for _iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples as f64) + (alpha * &weights);
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn snapshot(&self) -> TrainedModel {
        TrainedModel::LogisticRegression(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression() {
        let x = array![
            [0.0, 0.0],
            [0.5, 0.5],
            [1.0, 0.0],
            [3.0, 3.0],
            [3.5, 3.0],
            [4.0, 4.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_max_iter(2000);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_no_intercept_keeps_bias_at_zero() {
        let x = array![[-1.0], [-2.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.set_param("fit_intercept", &ParamValue::Bool(false)).unwrap();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.intercept, Some(0.0));
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_params() {
        let mut model = LogisticRegression::new();
        model.set_param("C", &ParamValue::Float(0.1)).unwrap();
        model.set_param("max_iter", &ParamValue::Int(50)).unwrap();

        assert_eq!(model.get_param("C"), Some(ParamValue::Float(0.1)));
        assert_eq!(model.max_iter, 50);
        assert!(model.set_param("C", &ParamValue::Float(0.0)).is_err());
        assert!(model.set_param("penalty", &"l1".into()).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        assert!(matches!(model.predict(&array![[1.0]]), Err(AutoMlError::ModelNotFitted)));
    }
}
