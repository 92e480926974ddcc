//! Gaussian Naive Bayes classifier

use super::models::{Configurable, Estimator, TrainedModel};
use super::params::{self, ParamValue};
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const TYPE_NAME: &str = "GaussianNB";

/// Per-class sufficient statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    label: f64,
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Statistics in ascending class order
    classes: Vec<ClassStats>,
    /// Portion of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// Class priors in ascending class order
    pub fn class_priors(&self) -> Vec<(f64, f64)> {
        self.classes.iter().map(|c| (c.label, c.log_prior.exp())).collect()
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>, stats: &ClassStats) -> f64 {
        let log_likelihood: f64 = row
            .iter()
            .zip(stats.means.iter().zip(stats.variances.iter()))
            .map(|(&xi, (&mean, &var))| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
            .sum();
        stats.log_prior + log_likelihood
    }

    /// Predict probabilities, one column per class in ascending order
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(AutoMlError::ModelNotFitted);
        }

        let mut probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let jll: Vec<f64> = self
                .classes
                .iter()
                .map(|stats| self.joint_log_likelihood(row, stats))
                .collect();

            // log-sum-exp normalization
            let max_val = jll.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = jll.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            for (j, v) in jll.iter().enumerate() {
                probs[[i, j]] = (v - max_val - log_sum).exp();
            }
        }

        Ok(probs)
    }
}

impl Configurable for GaussianNaiveBayes {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "var_smoothing" => self.var_smoothing = params::positive_f64(TYPE_NAME, name, value)?,
            _ => return Err(params::unknown_property(TYPE_NAME, name)),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "var_smoothing" => Some(self.var_smoothing.into()),
            _ => None,
        }
    }
}

impl Estimator for GaussianNaiveBayes {
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
                "cannot fit naive Bayes on zero samples".to_string(),
            ));
        }

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0, f64::max).max(f64::MIN_POSITIVE);

        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, &label) in y.iter().enumerate() {
            by_class.entry(label.round() as i64).or_default().push(i);
        }

        self.classes = by_class
            .into_iter()
            .map(|(label, indices)| {
                // Single-pass Welford's algorithm for mean and variance
                let mut means = vec![0.0; n_features];
                let mut m2 = vec![0.0; n_features];
                for (count, &idx) in indices.iter().enumerate() {
                    for (j, &val) in x.row(idx).iter().enumerate() {
                        let delta = val - means[j];
                        means[j] += delta / (count + 1) as f64;
                        m2[j] += delta * (val - means[j]);
                    }
                }
                let n_class = indices.len() as f64;
                ClassStats {
                    label: label as f64,
                    log_prior: (n_class / n_samples as f64).ln(),
                    means,
                    variances: m2.iter().map(|&v| v / n_class + epsilon).collect(),
                }
            })
            .collect();

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classes.is_empty() {
            return Err(AutoMlError::ModelNotFitted);
        }
        let n_features = self.classes[0].means.len();
        if x.ncols() != n_features {
            return Err(AutoMlError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let predictions = x
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = (f64::NEG_INFINITY, self.classes[0].label);
                for stats in &self.classes {
                    let jll = self.joint_log_likelihood(row, stats);
                    if jll > best.0 {
                        best = (jll, stats.label);
                    }
                }
                best.1
            })
            .collect();

        Ok(predictions)
    }

    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn snapshot(&self) -> TrainedModel {
        TrainedModel::GaussianNB(self.clone())
    }
}
