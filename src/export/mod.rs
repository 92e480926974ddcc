//! Deployable model bundle: fitted preprocessing plus the selected model

use crate::error::{AutoMlError, Result};
use crate::preprocessing::PreprocessingPipeline;
use crate::training::{Params, TrainedModel};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Provenance of a packaged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub serial_id: String,
    pub best_params: Params,
    /// Mean cross-validated score from the search
    pub best_score: f64,
    /// Harmonic mean of train and test accuracy
    pub model_accuracy: f64,
    pub created_at: DateTime<Utc>,
}

/// Preprocessing and model packaged together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCardEstimator {
    pub preprocessing: PreprocessingPipeline,
    pub model: TrainedModel,
    pub metadata: Option<ModelMetadata>,
}

impl CreditCardEstimator {
    pub fn new(preprocessing: PreprocessingPipeline, model: TrainedModel) -> Self {
        Self {
            preprocessing,
            model,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Preprocess raw feature columns and predict class labels
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = self.preprocessing.transform(df)?;
        self.model.predict(&x)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), model = self.model.type_name(), "Saved model bundle");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AutoMlError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let estimator: Self = serde_json::from_str(&json)?;
        if !estimator.preprocessing.is_fitted() {
            return Err(AutoMlError::ModelNotFitted);
        }
        Ok(estimator)
    }
}

impl fmt::Display for CreditCardEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.model.type_name())
    }
}
