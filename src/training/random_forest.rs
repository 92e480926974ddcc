//! Random Forest implementation

use super::decision_tree::{Criterion, DecisionTree};
use super::models::{Configurable, Estimator, TrainedModel};
use super::params::{self, ParamValue};
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TYPE_NAME: &str = "RandomForestClassifier";

/// Random Forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn from_param(name: &str, value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::Str(_) => {
                match params::choice(TYPE_NAME, name, value, &["sqrt", "log2", "auto"])? {
                    "log2" => Ok(MaxFeatures::Log2),
                    _ => Ok(MaxFeatures::Sqrt),
                }
            }
            ParamValue::Int(_) => Ok(MaxFeatures::Fixed(params::usize_at_least(TYPE_NAME, name, value, 1)?)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            _ => Err(AutoMlError::PropertyApplication {
                target: TYPE_NAME.to_string(),
                property: name.to_string(),
                reason: format!("expects \"sqrt\", \"log2\", an integer, a fraction in (0, 1] or null, got {}", value),
            }),
        }
    }

    fn to_param(self) -> ParamValue {
        match self {
            MaxFeatures::Sqrt => "sqrt".into(),
            MaxFeatures::Log2 => "log2".into(),
            MaxFeatures::Fraction(f) => f.into(),
            MaxFeatures::Fixed(n) => n.into(),
            MaxFeatures::All => ParamValue::Null,
        }
    }

    fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate().take(self.n_features) {
                    total_importances[i] += val;
                }
            }
        }

        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Configurable for RandomForest {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_estimators" => {
                self.n_estimators = params::usize_at_least(TYPE_NAME, name, value, 1)?
            }
            "criterion" => self.criterion = Criterion::from_param(TYPE_NAME, name, value)?,
            "max_depth" => self.max_depth = params::optional_usize(TYPE_NAME, name, value)?,
            "min_samples_split" => {
                self.min_samples_split = params::usize_at_least(TYPE_NAME, name, value, 2)?
            }
            "min_samples_leaf" => {
                self.min_samples_leaf = params::usize_at_least(TYPE_NAME, name, value, 1)?
            }
            "max_features" => self.max_features = MaxFeatures::from_param(name, value)?,
            "bootstrap" => self.bootstrap = params::bool_value(TYPE_NAME, name, value)?,
            "random_state" => self.random_state = params::optional_u64(TYPE_NAME, name, value)?,
            _ => return Err(params::unknown_property(TYPE_NAME, name)),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "n_estimators" => Some(self.n_estimators.into()),
            "criterion" => Some(self.criterion.as_str().into()),
            "max_depth" => Some(self.max_depth.into()),
            "min_samples_split" => Some(self.min_samples_split.into()),
            "min_samples_leaf" => Some(self.min_samples_leaf.into()),
            "max_features" => Some(self.max_features.to_param()),
            "bootstrap" => Some(self.bootstrap.into()),
            "random_state" => Some(self.random_state.map(|s| s as i64).into()),
            _ => None,
        }
    }
}

impl Estimator for RandomForest {
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
                "cannot fit a random forest on zero samples".to_string(),
            ));
        }

        self.n_features = n_features;
        let max_features = self.max_features.resolve(n_features);

        // Build trees in parallel; each tree owns a seed derived from its index
        let base_seed = self.random_state.unwrap_or(42);

        let trees: Result<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_random_state(seed);
                tree.max_depth = self.max_depth;
                tree.max_features = Some(max_features);

                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        self.compute_feature_importances();

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(AutoMlError::ModelNotFitted);
        }

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        // Majority vote; ties resolve to the smallest class
        let predictions: Vec<f64> = (0..x.nrows())
            .map(|i| {
                let mut votes: BTreeMap<i64, usize> = BTreeMap::new();
                for preds in &all_predictions {
                    *votes.entry(preds[i].round() as i64).or_insert(0) += 1;
                }
                let mut winner = (0i64, 0usize);
                for (class, count) in votes {
                    if count > winner.1 {
                        winner = (class, count);
                    }
                }
                winner.0 as f64
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn snapshot(&self) -> TrainedModel {
        TrainedModel::RandomForestClassifier(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rf = RandomForest::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 10);

        let accuracy = rf.score(&x, &y).unwrap();
        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let x = array![[0.0, 3.0], [1.0, 2.0], [2.0, 1.0], [3.0, 0.0], [4.0, 4.0], [5.0, 1.5]];
        let y = array![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];

        let mut a = RandomForest::new(8).with_random_state(7);
        let mut b = RandomForest::new(8).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_max_features_param() {
        let mut rf = RandomForest::default();
        rf.set_param("max_features", &"log2".into()).unwrap();
        assert_eq!(rf.max_features, MaxFeatures::Log2);
        rf.set_param("max_features", &ParamValue::Int(3)).unwrap();
        assert_eq!(rf.max_features, MaxFeatures::Fixed(3));
        rf.set_param("max_features", &ParamValue::Float(0.5)).unwrap();
        assert_eq!(rf.max_features, MaxFeatures::Fraction(0.5));
        rf.set_param("max_features", &ParamValue::Null).unwrap();
        assert_eq!(rf.max_features, MaxFeatures::All);
        assert!(rf.set_param("max_features", &ParamValue::Float(1.5)).is_err());

        assert_eq!(MaxFeatures::Sqrt.resolve(30), 6);
        assert_eq!(MaxFeatures::Fixed(50).resolve(30), 30);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut rf = RandomForest::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
    }
}
