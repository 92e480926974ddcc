//! Credit card AutoML - batch training pipeline for credit card default prediction
//!
//! The core is a configuration-driven model factory: a YAML document names a
//! search strategy and a list of candidate estimators by namespace and type,
//! each with fixed properties and a hyperparameter grid. Every candidate is
//! searched with cross-validation, the best one above an accuracy floor is
//! selected, and the winners are evaluated on held-out data.
//!
//! # Modules
//!
//! ## Model search
//! - [`factory`] - Type registry, search strategies and threshold-gated selection
//! - [`training`] - Estimators, parameter model and cross-validation
//! - [`evaluation`] - Held-out evaluation with an accuracy-gap limit
//!
//! ## Data
//! - [`schema`] - Dataset schema file
//! - [`preprocessing`] - Feature generation and scaling
//! - [`ingestion`] - Raw data copy and stratified train/test split
//! - [`validation`] - Schema checks and drift report
//! - [`transformation`] - Fit and apply preprocessing
//!
//! ## Pipeline
//! - [`trainer`] - Search, evaluate and package the accepted model
//! - [`pipeline`] - Stage orchestration and artifact layout
//! - [`export`] - Model bundle persistence
//! - [`cli`] - Command-line interface

pub mod error;

pub mod evaluation;
pub mod factory;
pub mod training;

pub mod ingestion;
pub mod preprocessing;
pub mod schema;
pub mod transformation;
pub mod validation;

pub mod export;
pub mod pipeline;
pub mod trainer;
pub mod utils;

pub mod cli;

pub use error::{AutoMlError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{AutoMlError, Result};

    pub use crate::evaluation::{evaluate, EvaluationRecord, ModelEvaluator, ModelMetrics, ZeroDivisionPolicy};
    pub use crate::factory::{
        select_best, GridSearchCV, ModelFactory, ModelSearchConfig, RandomizedSearchCV, SearchResult,
        SearchStrategy, SelectedModel, TypeRegistry,
    };
    pub use crate::training::{Configurable, Estimator, ParamGrid, ParamValue, Params, TrainedModel};

    pub use crate::export::CreditCardEstimator;
    pub use crate::pipeline::{Pipeline, PipelineConfig};
    pub use crate::preprocessing::PreprocessingPipeline;
    pub use crate::schema::DatasetSchema;
}
