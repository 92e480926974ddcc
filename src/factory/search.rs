//! Cross-validated hyperparameter search strategies

use crate::error::{AutoMlError, Result};
use crate::training::params;
use crate::training::{
    accuracy_score, expand_grid, format_params, CVResults, CVSplit, CVStrategy, Configurable,
    ConfusionMatrix, CrossValidator, Estimator, ParamGrid, ParamValue, Params,
};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A hyperparameter search bound to one estimator and its grid
pub trait SearchStrategy: Configurable + Send + Sync {
    /// Run the search and refit the best combination on all of `x`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchOutcome>;
}

/// Scores of one parameter combination across the folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationScore {
    pub params: Params,
    pub cv: CVResults,
    /// 1 = best; equal means share a rank
    pub rank: usize,
}

/// What a finished search reports
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The estimator refit on the full data with `best_params`
    pub best_estimator: Box<dyn Estimator>,
    pub best_params: Params,
    /// Mean cross-validated score of `best_params`
    pub best_score: f64,
    /// Every combination evaluated, in search order
    pub cv_results: Vec<CombinationScore>,
}

/// Metric used to score each held-out fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Scoring {
    #[default]
    Accuracy,
    Precision,
    Recall,
    F1,
}

impl Scoring {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::Accuracy => "accuracy",
            Scoring::Precision => "precision",
            Scoring::Recall => "recall",
            Scoring::F1 => "f1",
        }
    }

    /// Score predictions; undefined precision, recall or F1 count as 0
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if let Scoring::Accuracy = self {
            return accuracy_score(y_true, y_pred);
        }
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        let value = match self {
            Scoring::Precision => cm.precision(),
            Scoring::Recall => cm.recall(),
            _ => cm.f1(),
        };
        Ok(value.unwrap_or(0.0))
    }
}

/// What to do when fitting or scoring one fold fails
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ErrorScore {
    /// Abort the search
    #[default]
    Raise,
    /// Record this score for the fold and continue
    Value(f64),
}

/// Settings shared by every search strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Number of stratified folds
    pub cv: usize,
    pub scoring: Scoring,
    /// 1 = sequential, -1 = all cores, -2 = all but one, n = n workers
    pub n_jobs: i64,
    /// 0 = quiet, 1 = one line per combination, 2 = one line per fold
    pub verbose: u64,
    /// Shuffle each class before dealing folds
    pub shuffle: bool,
    pub random_state: Option<u64>,
    pub error_score: ErrorScore,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cv: 5,
            scoring: Scoring::Accuracy,
            n_jobs: 1,
            verbose: 0,
            shuffle: false,
            random_state: None,
            error_score: ErrorScore::Raise,
        }
    }
}

impl SearchSettings {
    fn set_param(&mut self, target: &str, name: &str, value: &ParamValue) -> Result<bool> {
        match name {
            "cv" => {
                let folds = params::usize_value(target, name, value)?;
                if folds < 2 {
                    return Err(AutoMlError::PropertyApplication {
                        target: target.to_string(),
                        property: name.to_string(),
                        reason: "needs at least 2 folds".to_string(),
                    });
                }
                self.cv = folds;
            }
            "scoring" => {
                self.scoring = match params::choice(target, name, value, &["accuracy", "precision", "recall", "f1"])? {
                    "accuracy" => Scoring::Accuracy,
                    "precision" => Scoring::Precision,
                    "recall" => Scoring::Recall,
                    _ => Scoring::F1,
                }
            }
            "n_jobs" => {
                let jobs = if value.is_null() { 1 } else { params::i64_value(target, name, value)? };
                if jobs == 0 {
                    return Err(AutoMlError::PropertyApplication {
                        target: target.to_string(),
                        property: name.to_string(),
                        reason: "cannot be 0".to_string(),
                    });
                }
                self.n_jobs = jobs;
            }
            "verbose" => {
                self.verbose = match value {
                    ParamValue::Bool(b) => u64::from(*b),
                    _ => params::usize_value(target, name, value)? as u64,
                }
            }
            "shuffle" => self.shuffle = params::bool_value(target, name, value)?,
            "random_state" => self.random_state = params::optional_u64(target, name, value)?,
            "error_score" => {
                self.error_score = match value {
                    ParamValue::Str(s) if s.eq_ignore_ascii_case("raise") => ErrorScore::Raise,
                    ParamValue::Str(s) if s.eq_ignore_ascii_case("nan") => ErrorScore::Value(f64::NAN),
                    _ => ErrorScore::Value(value.as_f64().ok_or_else(|| AutoMlError::PropertyApplication {
                        target: target.to_string(),
                        property: name.to_string(),
                        reason: format!("expects \"raise\" or a number, got {}", value),
                    })?),
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "cv" => Some(self.cv.into()),
            "scoring" => Some(self.scoring.as_str().into()),
            "n_jobs" => Some(self.n_jobs.into()),
            "verbose" => Some((self.verbose as i64).into()),
            "shuffle" => Some(self.shuffle.into()),
            "random_state" => Some(self.random_state.map(|s| s as i64).into()),
            "error_score" => Some(match self.error_score {
                ErrorScore::Raise => "raise".into(),
                ErrorScore::Value(v) => v.into(),
            }),
            _ => None,
        }
    }

    fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        if self.n_jobs > 0 {
            self.n_jobs as usize
        } else {
            (cores as i64 + 1 + self.n_jobs).max(1) as usize
        }
    }

    /// Cross-validate every combination and refit the winner.
    ///
    /// The winner is the first combination with the highest mean score, so
    /// ties resolve to search order.
    fn run(
        &self,
        target: &str,
        estimator: &dyn Estimator,
        combinations: Vec<Params>,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<SearchOutcome> {
        if x.nrows() != y.len() {
            return Err(AutoMlError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let start = Instant::now();
        let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.cv,
            shuffle: self.shuffle,
        })
        .with_random_state(self.random_state)
        .split(x.nrows(), Some(y))?;

        info!(
            search = target,
            estimator = estimator.type_name(),
            candidates = combinations.len(),
            folds = splits.len(),
            fits = combinations.len() * splits.len(),
            "Starting hyperparameter search"
        );

        let evaluate = |params: &Params| self.cross_validate(estimator, params, &splits, x, y);
        let workers = self.worker_count();
        let fold_results: Vec<CVResults> = if workers == 1 {
            combinations.iter().map(evaluate).collect::<Result<_>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| AutoMlError::ThreadPoolError(e.to_string()))?;
            pool.install(|| combinations.par_iter().map(evaluate).collect::<Result<_>>())?
        };

        let mut best: Option<usize> = None;
        for (idx, cv) in fold_results.iter().enumerate() {
            if cv.mean_score.is_nan() {
                continue;
            }
            match best {
                Some(b) if fold_results[b].mean_score >= cv.mean_score => {}
                _ => best = Some(idx),
            }
        }
        let best = best.ok_or_else(|| {
            AutoMlError::TrainingError(format!(
                "every parameter combination of {} failed to score",
                estimator.type_name()
            ))
        })?;

        let cv_results = rank_results(
            combinations
                .into_iter()
                .zip(fold_results)
                .map(|(params, cv)| CombinationScore { params, cv, rank: 0 })
                .collect(),
        );

        let best_params = cv_results[best].params.clone();
        let best_score = cv_results[best].cv.mean_score;

        let mut best_estimator = estimator.clone_box();
        best_estimator.set_params(&best_params)?;
        best_estimator.fit(x, y)?;

        info!(
            search = target,
            estimator = estimator.type_name(),
            best_score,
            best_params = %format_params(&best_params),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Hyperparameter search finished"
        );

        Ok(SearchOutcome {
            best_estimator,
            best_params,
            best_score,
            cv_results,
        })
    }

    fn cross_validate(
        &self,
        estimator: &dyn Estimator,
        params: &Params,
        splits: &[CVSplit],
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<CVResults> {
        let mut model = estimator.clone_box();
        // An invalid combination is a configuration error, never a fold failure
        model.set_params(params)?;

        let mut scores = Vec::with_capacity(splits.len());
        for split in splits {
            let score = match self.fit_and_score(model.as_mut(), split, x, y) {
                Ok(score) => score,
                Err(e) => match self.error_score {
                    ErrorScore::Raise => return Err(e),
                    ErrorScore::Value(v) => {
                        warn!(
                            params = %format_params(params),
                            fold = split.fold_idx,
                            error = %e,
                            "Fold failed; recording error_score"
                        );
                        v
                    }
                },
            };

            if self.verbose >= 2 {
                info!(params = %format_params(params), fold = split.fold_idx, score, "Fold scored");
            }
            scores.push(score);
        }

        let cv = CVResults::from_scores(scores);
        if self.verbose >= 1 {
            info!(params = %format_params(params), mean = cv.mean_score, std = cv.std_score, "Combination scored");
        } else {
            debug!(params = %format_params(params), mean = cv.mean_score, "Combination scored");
        }
        Ok(cv)
    }

    fn fit_and_score(
        &self,
        model: &mut dyn Estimator,
        split: &CVSplit,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<f64> {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        model.fit(&x_train, &y_train)?;
        let y_pred = model.predict(&x_test)?;
        self.scoring.score(&y_test, &y_pred)
    }
}

fn rank_results(mut results: Vec<CombinationScore>) -> Vec<CombinationScore> {
    let means: Vec<f64> = results.iter().map(|r| r.cv.mean_score).collect();
    for result in &mut results {
        let mean = result.cv.mean_score;
        result.rank = if mean.is_nan() {
            means.len()
        } else {
            1 + means.iter().filter(|&&m| m > mean).count()
        };
    }
    results
}

/// Exhaustive search over every combination of the grid
#[derive(Debug, Clone)]
pub struct GridSearchCV {
    estimator: Box<dyn Estimator>,
    param_grid: ParamGrid,
    pub settings: SearchSettings,
}

impl GridSearchCV {
    pub fn new(estimator: Box<dyn Estimator>, param_grid: ParamGrid) -> Self {
        Self {
            estimator,
            param_grid,
            settings: SearchSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Configurable for GridSearchCV {
    fn type_name(&self) -> &'static str {
        "GridSearchCV"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        if self.settings.set_param(self.type_name(), name, value)? {
            Ok(())
        } else {
            Err(params::unknown_property(self.type_name(), name))
        }
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        self.settings.get_param(name)
    }
}

impl SearchStrategy for GridSearchCV {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchOutcome> {
        let combinations = expand_grid(&self.param_grid)?;
        self.settings
            .run(self.type_name(), self.estimator.as_ref(), combinations, x, y)
    }
}

/// Search over a fixed number of combinations drawn without replacement
#[derive(Debug, Clone)]
pub struct RandomizedSearchCV {
    estimator: Box<dyn Estimator>,
    param_distributions: ParamGrid,
    /// Number of combinations sampled
    pub n_iter: usize,
    pub settings: SearchSettings,
}

impl RandomizedSearchCV {
    pub fn new(estimator: Box<dyn Estimator>, param_distributions: ParamGrid) -> Self {
        Self {
            estimator,
            param_distributions,
            n_iter: 10,
            settings: SearchSettings::default(),
        }
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// The sampled combinations in draw order; the whole grid if it is small
    fn sample_combinations(&self) -> Result<Vec<Params>> {
        let all = expand_grid(&self.param_distributions)?;
        if self.n_iter >= all.len() {
            if self.n_iter > all.len() {
                warn!(
                    n_iter = self.n_iter,
                    grid_size = all.len(),
                    "n_iter exceeds the grid size; searching the full grid"
                );
            }
            return Ok(all);
        }

        let mut rng = match self.settings.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(sample(&mut rng, all.len(), self.n_iter)
            .into_iter()
            .map(|idx| all[idx].clone())
            .collect())
    }
}

impl Configurable for RandomizedSearchCV {
    fn type_name(&self) -> &'static str {
        "RandomizedSearchCV"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        if name == "n_iter" {
            self.n_iter = params::usize_at_least(self.type_name(), name, value, 1)?;
            return Ok(());
        }
        if self.settings.set_param(self.type_name(), name, value)? {
            Ok(())
        } else {
            Err(params::unknown_property(self.type_name(), name))
        }
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "n_iter" => Some(self.n_iter.into()),
            _ => self.settings.get_param(name),
        }
    }
}

impl SearchStrategy for RandomizedSearchCV {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchOutcome> {
        let combinations = self.sample_combinations()?;
        self.settings
            .run(self.type_name(), self.estimator.as_ref(), combinations, x, y)
    }
}
