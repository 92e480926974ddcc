//! Estimator traits, serializable model snapshots and classification counts

use super::decision_tree::DecisionTree;
use super::knn::KNNClassifier;
use super::linear_models::LogisticRegression;
use super::naive_bayes::GaussianNaiveBayes;
use super::params::{ParamValue, Params};
use super::random_forest::RandomForest;
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named, settable properties on a constructed instance.
///
/// This is how configuration overrides reach estimators and search
/// strategies: every override is applied by name after zero-argument
/// construction, and unknown names or ill-typed values are rejected.
pub trait Configurable {
    /// Short type name, e.g. `DecisionTreeClassifier`
    fn type_name(&self) -> &'static str;

    /// Set one property
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Read one property back (None if the name is unknown)
    fn get_param(&self, name: &str) -> Option<ParamValue>;

    /// Apply every entry of `params`, stopping at the first rejection
    fn set_params(&mut self, params: &Params) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}

/// Trait for binary classifiers searched by the model factory
pub trait Estimator: Configurable + Send + Sync + fmt::Debug {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_fitted(&self) -> bool;

    /// Clone behind the trait object; search strategies fit clones, never the original
    fn clone_box(&self) -> Box<dyn Estimator>;

    /// Serializable form used when a model is packaged
    fn snapshot(&self) -> TrainedModel;

    /// Mean accuracy on the given data
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        accuracy_score(y, &y_pred)
    }
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Serializable snapshot of every estimator the registry can build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    DecisionTreeClassifier(DecisionTree),
    RandomForestClassifier(RandomForest),
    KNeighborsClassifier(KNNClassifier),
    GaussianNB(GaussianNaiveBayes),
}

impl TrainedModel {
    /// Turn the snapshot back into a live estimator
    pub fn into_estimator(self) -> Box<dyn Estimator> {
        match self {
            TrainedModel::LogisticRegression(m) => Box::new(m),
            TrainedModel::DecisionTreeClassifier(m) => Box::new(m),
            TrainedModel::RandomForestClassifier(m) => Box::new(m),
            TrainedModel::KNeighborsClassifier(m) => Box::new(m),
            TrainedModel::GaussianNB(m) => Box::new(m),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TrainedModel::LogisticRegression(m) => m.type_name(),
            TrainedModel::DecisionTreeClassifier(m) => m.type_name(),
            TrainedModel::RandomForestClassifier(m) => m.type_name(),
            TrainedModel::KNeighborsClassifier(m) => m.type_name(),
            TrainedModel::GaussianNB(m) => m.type_name(),
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::LogisticRegression(m) => Estimator::predict(m, x),
            TrainedModel::DecisionTreeClassifier(m) => Estimator::predict(m, x),
            TrainedModel::RandomForestClassifier(m) => Estimator::predict(m, x),
            TrainedModel::KNeighborsClassifier(m) => Estimator::predict(m, x),
            TrainedModel::GaussianNB(m) => Estimator::predict(m, x),
        }
    }
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(AutoMlError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(AutoMlError::ValidationError(
            "cannot score an empty label vector".to_string(),
        ));
    }
    Ok(())
}

/// Fraction of predictions matching the labels
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// 2x2 confusion matrix for binary labels (positive means > 0.5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let mut cm = Self::default();

        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            match (*t > 0.5, *p > 0.5) {
                (true, true) => cm.true_positives += 1,
                (false, true) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (true, false) => cm.false_negatives += 1,
            }
        }

        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    /// TP / (TP + FP); None when nothing was predicted positive
    pub fn precision(&self) -> Option<f64> {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN); None when there are no actual positives
    pub fn recall(&self) -> Option<f64> {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall; None when either is undefined or both are zero
    pub fn f1(&self) -> Option<f64> {
        let p = self.precision()?;
        let r = self.recall()?;
        if p + r > 0.0 {
            Some(2.0 * p * r / (p + r))
        } else {
            None
        }
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}
