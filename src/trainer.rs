//! Model trainer: search every configured candidate, evaluate the winners on
//! held-out data and package the accepted model with its preprocessing

use crate::error::{AutoMlError, Result};
use crate::evaluation::{ModelEvaluator, ModelMetrics, DEFAULT_MAX_ACCURACY_GAP};
use crate::export::{CreditCardEstimator, ModelMetadata};
use crate::factory::{select_best, ModelFactory, DEFAULT_BASE_ACCURACY};
use crate::preprocessing::PreprocessingPipeline;
use crate::training::{Estimator, Params};
use crate::transformation::{load_transformed, DataTransformationArtifact};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTrainerConfig {
    /// YAML document describing the search strategy and candidates
    pub model_config_path: PathBuf,
    pub base_accuracy: f64,
    pub max_accuracy_gap: f64,
    /// Search candidates concurrently
    pub parallel_search: bool,
    pub model_file_name: String,
}

impl Default for ModelTrainerConfig {
    fn default() -> Self {
        Self {
            model_config_path: PathBuf::from("config/model.yaml"),
            base_accuracy: DEFAULT_BASE_ACCURACY,
            max_accuracy_gap: DEFAULT_MAX_ACCURACY_GAP,
            parallel_search: false,
            model_file_name: "model.json".to_string(),
        }
    }
}

impl ModelTrainerConfig {
    pub fn new(model_config_path: impl Into<PathBuf>) -> Self {
        Self {
            model_config_path: model_config_path.into(),
            ..Default::default()
        }
    }

    pub fn with_base_accuracy(mut self, base_accuracy: f64) -> Self {
        self.base_accuracy = base_accuracy;
        self
    }

    pub fn with_max_accuracy_gap(mut self, gap: f64) -> Self {
        self.max_accuracy_gap = gap;
        self
    }

    pub fn with_parallel_search(mut self, parallel: bool) -> Self {
        self.parallel_search = parallel;
        self
    }
}

/// Outcome of the trainer stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub model_file_path: PathBuf,
    pub metrics_file_path: PathBuf,
    pub serial_id: String,
    pub best_params: Params,
    pub metrics: ModelMetrics,
}

pub struct ModelTrainer<'a> {
    config: ModelTrainerConfig,
    transformation: &'a DataTransformationArtifact,
    output_dir: PathBuf,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(
        config: ModelTrainerConfig,
        transformation: &'a DataTransformationArtifact,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            transformation,
            output_dir: output_dir.into(),
        }
    }

    pub fn run(&self) -> Result<ModelTrainerArtifact> {
        let target = &self.transformation.target_column;
        let (x_train, y_train) =
            load_transformed(&self.transformation.transformed_train_file_path, target)?;
        let (x_test, y_test) =
            load_transformed(&self.transformation.transformed_test_file_path, target)?;

        let factory = ModelFactory::from_path(&self.config.model_config_path)?;
        let candidates = factory.initialized_candidates()?;
        info!(candidates = candidates.len(), "Searching candidate models");
        let results = if self.config.parallel_search {
            factory.search_all_parallel(&candidates, &x_train, &y_train)?
        } else {
            factory.search_all(&candidates, &x_train, &y_train)?
        };

        let selected = select_best(results.clone(), self.config.base_accuracy)?;
        info!(
            serial_id = %selected.result.serial_id,
            model = %selected.result.model_name,
            score = selected.result.best_score,
            "Best model on training data"
        );

        let models: Vec<Box<dyn Estimator>> =
            results.iter().map(|r| r.best_estimator.clone()).collect();
        let record = ModelEvaluator::new()
            .with_registry(factory.registry().clone())
            .with_base_accuracy(self.config.base_accuracy)
            .with_max_accuracy_gap(self.config.max_accuracy_gap)
            .evaluate(&models, &x_train, &y_train, &x_test, &y_test)?
            .ok_or(AutoMlError::NoAcceptableModel {
                threshold: self.config.base_accuracy,
            })?;

        let accepted = &results[record.metrics.index];
        let preprocessing = PreprocessingPipeline::load(&self.transformation.preprocessing_file_path)?;
        let estimator = CreditCardEstimator::new(preprocessing, record.model.snapshot()).with_metadata(
            ModelMetadata {
                model_name: accepted.model_name.clone(),
                serial_id: accepted.serial_id.clone(),
                best_params: accepted.best_params.clone(),
                best_score: accepted.best_score,
                model_accuracy: record.metrics.model_accuracy,
                created_at: chrono::Utc::now(),
            },
        );

        let model_file_path = self.output_dir.join(&self.config.model_file_name);
        estimator.save(&model_file_path)?;
        let metrics_file_path = self.output_dir.join("metrics.json");
        std::fs::write(&metrics_file_path, serde_json::to_string_pretty(&record.metrics)?)?;

        info!(
            serial_id = %accepted.serial_id,
            model = %accepted.model_name,
            train_accuracy = record.metrics.train_accuracy,
            test_accuracy = record.metrics.test_accuracy,
            f1 = record.metrics.f1,
            "Model trainer completed"
        );

        Ok(ModelTrainerArtifact {
            model_file_path,
            metrics_file_path,
            serial_id: accepted.serial_id.clone(),
            best_params: accepted.best_params.clone(),
            metrics: record.metrics,
        })
    }
}
