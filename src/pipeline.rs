//! End-to-end training pipeline
//!
//! ```text
//! ingestion -> validation -> transformation -> trainer -> packaging
//! ```
//!
//! Each run writes its artifacts under `<artifact_dir>/<timestamp>/<stage>/`.

use crate::error::{AutoMlError, Result};
use crate::ingestion::{DataIngestion, DataIngestionArtifact, DataIngestionConfig};
use crate::schema::DatasetSchema;
use crate::trainer::{ModelTrainer, ModelTrainerArtifact, ModelTrainerConfig};
use crate::transformation::{DataTransformation, DataTransformationArtifact};
use crate::validation::{DataValidation, DataValidationArtifact, DataValidationConfig};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Configuration of a full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub artifact_dir: PathBuf,
    /// Where the packaged model is published; skipped when unset
    pub export_dir: Option<PathBuf>,
    pub ingestion: DataIngestionConfig,
    pub validation: DataValidationConfig,
    pub trainer: ModelTrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("artifact"),
            export_dir: None,
            ingestion: DataIngestionConfig::default(),
            validation: DataValidationConfig::default(),
            trainer: ModelTrainerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AutoMlError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&yaml)?)
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    pub fn with_ingestion(mut self, ingestion: DataIngestionConfig) -> Self {
        self.ingestion = ingestion;
        self
    }

    pub fn with_validation(mut self, validation: DataValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_trainer(mut self, trainer: ModelTrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }
}

/// Everything a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub run_dir: PathBuf,
    pub ingestion: DataIngestionArtifact,
    pub validation: DataValidationArtifact,
    pub transformation: DataTransformationArtifact,
    pub trainer: ModelTrainerArtifact,
    /// Published copy of the model bundle
    pub packaged_model_path: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order; the first failing stage aborts the run
    pub fn run(&self) -> Result<PipelineArtifact> {
        let start = Instant::now();
        let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let run_dir = self.config.artifact_dir.join(&timestamp);
        info!(run_dir = %run_dir.display(), "Pipeline started");

        let ingestion = self.stage("data_ingestion", || {
            DataIngestion::new(self.config.ingestion.clone(), run_dir.join("data_ingestion")).run()
        })?;

        let validation = self.stage("data_validation", || {
            DataValidation::new(
                self.config.validation.clone(),
                &ingestion,
                run_dir.join("data_validation"),
            )
            .run()
        })?;

        let schema = DatasetSchema::from_path(&validation.schema_file_path)?;
        let transformation = self.stage("data_transformation", || {
            DataTransformation::new(&schema, &ingestion, run_dir.join("data_transformation")).run()
        })?;

        let trainer = self.stage("model_trainer", || {
            ModelTrainer::new(
                self.config.trainer.clone(),
                &transformation,
                run_dir.join("model_trainer"),
            )
            .run()
        })?;

        let packaged_model_path =
            self.stage("packaging", || self.package(&trainer, &run_dir, &timestamp))?;

        let artifact = PipelineArtifact {
            run_dir: run_dir.clone(),
            ingestion,
            validation,
            transformation,
            trainer,
            packaged_model_path,
        };
        std::fs::write(
            run_dir.join("pipeline_artifact.json"),
            serde_json::to_string_pretty(&artifact)?,
        )?;

        info!(
            run_dir = %run_dir.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Pipeline completed"
        );
        Ok(artifact)
    }

    fn stage<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        info!(stage = name, "{} {} started {}", "=".repeat(20), name, "=".repeat(20));
        let start = Instant::now();
        let out = f()?;
        info!(stage = name, elapsed_secs = start.elapsed().as_secs_f64(), "Stage completed");
        Ok(out)
    }

    /// Copy the bundle into the run's packaging directory and, when
    /// configured, into `<export_dir>/<timestamp>/`
    fn package(&self, trainer: &ModelTrainerArtifact, run_dir: &Path, timestamp: &str) -> Result<PathBuf> {
        let file_name = &self.config.trainer.model_file_name;
        let packaging_dir = run_dir.join("packaging");
        std::fs::create_dir_all(&packaging_dir)?;
        let packaged = packaging_dir.join(file_name);
        std::fs::copy(&trainer.model_file_path, &packaged)?;

        let Some(export_dir) = &self.config.export_dir else {
            return Ok(packaged);
        };
        let export_path = export_dir.join(timestamp).join(file_name);
        if let Some(parent) = export_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&packaged, &export_path)?;
        info!(path = %export_path.display(), "Published model bundle");
        Ok(export_path)
    }
}
