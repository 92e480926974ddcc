//! Configuration-driven model search
//!
//! [`ModelFactory`] turns a [`ModelSearchConfig`] into live estimators via the
//! [`TypeRegistry`], runs the configured search strategy over each candidate
//! and selects the best result above an accuracy floor:
//!
//! ```text
//! config -> initialized_candidates -> search_all -> select_best
//! ```
//!
//! Any failure aborts the whole batch; a failed candidate search is reported
//! as `CandidateSearch` carrying the candidate's serial id.

pub mod config;
pub mod registry;
pub mod search;
pub mod selection;

pub use config::{CandidateSpec, ModelSearchConfig, SearchStrategySpec};
pub use registry::{TypeHandle, TypeKind, TypeRegistry};
pub use search::{
    CombinationScore, ErrorScore, GridSearchCV, RandomizedSearchCV, Scoring, SearchOutcome,
    SearchSettings, SearchStrategy,
};
pub use selection::{select_best, select_best_index, Ratchet, SelectedModel, DEFAULT_BASE_ACCURACY};

use crate::error::{AutoMlError, Result};
use crate::training::{format_params, Estimator, ParamGrid, Params};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// A candidate resolved into an unfit estimator
#[derive(Debug, Clone)]
pub struct InitializedCandidate {
    pub serial_id: String,
    /// `namespace.TypeName`
    pub model_name: String,
    pub estimator: Box<dyn Estimator>,
    pub search_param_grid: ParamGrid,
}

/// The outcome of searching one candidate
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub serial_id: String,
    pub model_name: String,
    /// The unfit estimator the search started from
    pub estimator: Box<dyn Estimator>,
    /// Refit with `best_params` on the full training data
    pub best_estimator: Box<dyn Estimator>,
    pub best_params: Params,
    pub best_score: f64,
}

/// Builds, searches and selects candidate models from a configuration
#[derive(Clone)]
pub struct ModelFactory {
    config: ModelSearchConfig,
    registry: TypeRegistry,
}

impl ModelFactory {
    /// Factory over the built-in type registry
    pub fn new(config: ModelSearchConfig) -> Self {
        Self {
            config,
            registry: TypeRegistry::new(),
        }
    }

    /// Load the configuration from a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(ModelSearchConfig::from_path(path)?))
    }

    /// Replace the type registry
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ModelSearchConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Build one candidate's estimator with its fixed properties applied
    pub fn initialize(&self, spec: &CandidateSpec) -> Result<InitializedCandidate> {
        let handle = self.registry.resolve_type(&spec.namespace, &spec.type_name)?;
        let estimator = self.registry.construct(&handle, &spec.params)?;

        Ok(InitializedCandidate {
            serial_id: spec.serial_id.clone(),
            model_name: spec.qualified_name(),
            estimator,
            search_param_grid: spec.search_param_grid.clone(),
        })
    }

    /// Build every configured candidate, in configuration order
    pub fn initialized_candidates(&self) -> Result<Vec<InitializedCandidate>> {
        self.config
            .candidates
            .iter()
            .map(|spec| {
                self.initialize(spec).map_err(|e| {
                    error!(serial_id = %spec.serial_id, error = %e, "Candidate could not be initialized");
                    e
                })
            })
            .collect()
    }

    /// Run the configured search strategy over one candidate
    pub fn search(
        &self,
        candidate: &InitializedCandidate,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<SearchResult> {
        let strategy_spec = &self.config.search_strategy;
        let handle = self
            .registry
            .resolve_type(&strategy_spec.namespace, &strategy_spec.type_name)?;
        let mut strategy = self.registry.construct_strategy(
            &handle,
            candidate.estimator.clone_box(),
            candidate.search_param_grid.clone(),
            &strategy_spec.params,
        )?;

        info!(
            serial_id = %candidate.serial_id,
            model = %candidate.model_name,
            "Training started"
        );
        let start = Instant::now();
        let outcome = strategy.fit(x, y)?;
        info!(
            serial_id = %candidate.serial_id,
            model = %candidate.model_name,
            score = outcome.best_score,
            params = %format_params(&outcome.best_params),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Training completed"
        );

        Ok(SearchResult {
            serial_id: candidate.serial_id.clone(),
            model_name: candidate.model_name.clone(),
            estimator: candidate.estimator.clone_box(),
            best_estimator: outcome.best_estimator,
            best_params: outcome.best_params,
            best_score: outcome.best_score,
        })
    }

    /// Search every candidate in order, stopping at the first failure
    pub fn search_all(
        &self,
        candidates: &[InitializedCandidate],
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Vec<SearchResult>> {
        candidates
            .iter()
            .map(|candidate| {
                self.search(candidate, x, y)
                    .map_err(|e| AutoMlError::candidate_search(&candidate.serial_id, e))
            })
            .collect()
    }

    /// Search candidates concurrently.
    ///
    /// Results keep input order, and when several candidates fail the error
    /// reported is the one from the earliest candidate.
    pub fn search_all_parallel(
        &self,
        candidates: &[InitializedCandidate],
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Vec<SearchResult>> {
        let outcomes: Vec<Result<SearchResult>> = candidates
            .par_iter()
            .map(|candidate| {
                self.search(candidate, x, y)
                    .map_err(|e| AutoMlError::candidate_search(&candidate.serial_id, e))
            })
            .collect();

        outcomes.into_iter().collect()
    }

    /// Initialize, search and select in one call
    pub fn get_best_model(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        base_accuracy: f64,
    ) -> Result<SelectedModel> {
        info!(candidates = self.config.candidates.len(), "Initializing models from configuration");
        let candidates = self.initialized_candidates()?;
        let results = self.search_all(&candidates, x, y)?;
        select_best(results, base_accuracy)
    }

    /// Find a candidate by serial id
    pub fn find_candidate<'a>(
        candidates: &'a [InitializedCandidate],
        serial_id: &str,
    ) -> Option<&'a InitializedCandidate> {
        candidates.iter().find(|c| c.serial_id == serial_id)
    }
}
