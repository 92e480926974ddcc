//! Error types for the credit card AutoML pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AutoMlError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum AutoMlError {
    /// The model configuration document is malformed or misses a required key
    #[error("Config parse error at `{key}`: {reason}")]
    ConfigParse { key: String, reason: String },

    /// A namespace/type pair is not present in the type registry
    #[error("Type resolution error: no type `{type_name}` in namespace `{namespace}`")]
    TypeResolution { namespace: String, type_name: String },

    /// A property override was rejected by the target instance
    #[error("Property application error on {target}: `{property}` {reason}")]
    PropertyApplication {
        target: String,
        property: String,
        reason: String,
    },

    /// A candidate's search failed; aborts the whole batch
    #[error("Search failed for candidate `{serial_id}`: {source}")]
    CandidateSearch {
        serial_id: String,
        #[source]
        source: Box<AutoMlError>,
    },

    /// No candidate cleared the acceptance threshold
    #[error("None of the models has a score above the base accuracy: {threshold}")]
    NoAcceptableModel { threshold: f64 },

    /// A confusion-matrix metric has a zero denominator
    #[error("Degenerate metric: {metric} has a zero denominator")]
    DegenerateMetric { metric: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl AutoMlError {
    /// Wrap an error raised while searching the candidate `serial_id`
    pub fn candidate_search(serial_id: impl Into<String>, source: AutoMlError) -> Self {
        AutoMlError::CandidateSearch {
            serial_id: serial_id.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn config_parse(key: impl Into<String>, reason: impl Into<String>) -> Self {
        AutoMlError::ConfigParse {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for AutoMlError {
    fn from(err: polars::error::PolarsError) -> Self {
        AutoMlError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AutoMlError {
    fn from(err: serde_json::Error) -> Self {
        AutoMlError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AutoMlError {
    fn from(err: serde_yaml::Error) -> Self {
        AutoMlError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AutoMlError {
    fn from(err: ndarray::ShapeError) -> Self {
        AutoMlError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
