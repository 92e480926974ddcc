//! Held-out evaluation of fitted models
//!
//! Each model is scored on its training and test data. A model is accepted
//! when the harmonic mean of the two accuracies beats a ratcheting floor and
//! the accuracies are within `max_accuracy_gap` of each other; the last
//! accepted model is reported.

use crate::error::{AutoMlError, Result};
use crate::factory::{Ratchet, TypeRegistry, DEFAULT_BASE_ACCURACY};
use crate::training::{accuracy_score, ConfusionMatrix, Estimator};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Largest train/test accuracy difference a model may show
pub const DEFAULT_MAX_ACCURACY_GAP: f64 = 0.05;

/// How precision, recall and F1 behave when their denominator is zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ZeroDivisionPolicy {
    /// Report this value instead
    Sentinel(f64),
    /// Fail with `DegenerateMetric`
    Strict,
}

impl Default for ZeroDivisionPolicy {
    fn default() -> Self {
        ZeroDivisionPolicy::Sentinel(0.0)
    }
}

impl ZeroDivisionPolicy {
    fn resolve(&self, value: Option<f64>, metric: &str) -> Result<f64> {
        match (value, self) {
            (Some(v), _) => Ok(v),
            (None, ZeroDivisionPolicy::Sentinel(v)) => Ok(*v),
            (None, ZeroDivisionPolicy::Strict) => Err(AutoMlError::DegenerateMetric {
                metric: metric.to_string(),
            }),
        }
    }
}

/// Metrics of one evaluated model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub model_name: String,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    /// Harmonic mean of train and test accuracy
    pub model_accuracy: f64,
    /// `|test_accuracy - train_accuracy|`
    pub accuracy_gap: f64,
    pub confusion_matrix: ConfusionMatrix,
    /// Position in the evaluated list
    pub index: usize,
}

/// The accepted model and its metrics
#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub metrics: ModelMetrics,
    pub model: Box<dyn Estimator>,
}

/// Scores fitted models against held-out data
#[derive(Debug, Clone)]
pub struct ModelEvaluator {
    pub base_accuracy: f64,
    pub max_accuracy_gap: f64,
    pub zero_division: ZeroDivisionPolicy,
    /// Resolves the `namespace.TypeName` reported for each model
    registry: TypeRegistry,
}

impl Default for ModelEvaluator {
    fn default() -> Self {
        Self {
            base_accuracy: DEFAULT_BASE_ACCURACY,
            max_accuracy_gap: DEFAULT_MAX_ACCURACY_GAP,
            zero_division: ZeroDivisionPolicy::default(),
            registry: TypeRegistry::new(),
        }
    }
}

impl ModelEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_accuracy(mut self, base_accuracy: f64) -> Self {
        self.base_accuracy = base_accuracy;
        self
    }

    pub fn with_max_accuracy_gap(mut self, gap: f64) -> Self {
        self.max_accuracy_gap = gap;
        self
    }

    pub fn with_zero_division(mut self, policy: ZeroDivisionPolicy) -> Self {
        self.zero_division = policy;
        self
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Qualified name of `model`, or its bare type name when unregistered
    fn model_name(&self, model: &dyn Estimator) -> String {
        self.registry
            .qualified_name_of(model.type_name())
            .unwrap_or_else(|| model.type_name().to_string())
    }

    /// Compute every metric for one model
    pub fn measure(
        &self,
        model: &dyn Estimator,
        index: usize,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelMetrics> {
        let y_train_pred = model.predict(x_train)?;
        let y_test_pred = model.predict(x_test)?;

        let train_accuracy = accuracy_score(y_train, &y_train_pred)?;
        let test_accuracy = accuracy_score(y_test, &y_test_pred)?;

        let cm = ConfusionMatrix::from_predictions(y_test, &y_test_pred)?;
        let recall = self.zero_division.resolve(cm.recall(), "recall")?;
        let precision = self.zero_division.resolve(cm.precision(), "precision")?;
        let f1 = self.zero_division.resolve(cm.f1(), "f1")?;

        let denom = train_accuracy + test_accuracy;
        let model_accuracy = if denom > 0.0 {
            2.0 * train_accuracy * test_accuracy / denom
        } else {
            0.0
        };

        Ok(ModelMetrics {
            model_name: self.model_name(model),
            recall,
            precision,
            f1,
            train_accuracy,
            test_accuracy,
            model_accuracy,
            accuracy_gap: (test_accuracy - train_accuracy).abs(),
            confusion_matrix: cm,
            index,
        })
    }

    /// Evaluate `models` in order; `None` when no model is accepted
    pub fn evaluate(
        &self,
        models: &[Box<dyn Estimator>],
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<Option<EvaluationRecord>> {
        let mut ratchet = Ratchet::new(self.base_accuracy);
        let mut best: Option<EvaluationRecord> = None;

        for (index, model) in models.iter().enumerate() {
            let metrics = self.measure(model.as_ref(), index, x_train, y_train, x_test, y_test)?;

            debug!(
                model = %metrics.model_name,
                index,
                train_accuracy = metrics.train_accuracy,
                test_accuracy = metrics.test_accuracy,
                model_accuracy = metrics.model_accuracy,
                accuracy_gap = metrics.accuracy_gap,
                threshold = ratchet.threshold(),
                "Evaluated model"
            );

            if ratchet.admits(metrics.model_accuracy) && metrics.accuracy_gap < self.max_accuracy_gap {
                ratchet.raise_to(metrics.model_accuracy);
                info!(
                    model = %metrics.model_name,
                    index,
                    model_accuracy = metrics.model_accuracy,
                    f1 = metrics.f1,
                    "Accepted model"
                );
                best = Some(EvaluationRecord {
                    metrics,
                    model: model.clone_box(),
                });
            }
        }

        if best.is_none() {
            info!(base_accuracy = self.base_accuracy, "No model met the acceptance criteria");
        }
        Ok(best)
    }
}

/// Evaluate with the default gap limit and zero-division policy
pub fn evaluate(
    models: &[Box<dyn Estimator>],
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    base_accuracy: f64,
) -> Result<Option<EvaluationRecord>> {
    ModelEvaluator::new()
        .with_base_accuracy(base_accuracy)
        .evaluate(models, x_train, y_train, x_test, y_test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::DecisionTree;
    use ndarray::array;

    #[test]
    fn test_zero_division_policy() {
        assert_eq!(ZeroDivisionPolicy::default().resolve(None, "precision").unwrap(), 0.0);
        assert_eq!(ZeroDivisionPolicy::Sentinel(1.0).resolve(None, "recall").unwrap(), 1.0);
        assert_eq!(ZeroDivisionPolicy::Strict.resolve(Some(0.5), "f1").unwrap(), 0.5);
        assert!(matches!(
            ZeroDivisionPolicy::Strict.resolve(None, "precision"),
            Err(AutoMlError::DegenerateMetric { ref metric }) if metric == "precision"
        ));
    }

    #[test]
    fn test_perfect_model_metrics() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let metrics = ModelEvaluator::new().measure(&tree, 0, &x, &y, &x, &y).unwrap();
        assert_eq!(metrics.model_accuracy, 1.0);
        assert_eq!(metrics.accuracy_gap, 0.0);
        assert_eq!(metrics.recall, 1.0);
        assert_eq!(metrics.precision, 1.0);
        assert_eq!(metrics.f1, 1.0);
        assert_eq!(metrics.model_name, "tree.DecisionTreeClassifier");
    }
}
