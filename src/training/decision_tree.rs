//! Decision tree classifier

use super::models::{Configurable, Estimator, TrainedModel};
use super::params::{self, ParamValue};
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const TYPE_NAME: &str = "DecisionTreeClassifier";

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the predicted class
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity
    Gini,
    /// Shannon entropy
    Entropy,
}

impl Criterion {
    pub(crate) fn from_param(target: &str, name: &str, value: &ParamValue) -> Result<Self> {
        match params::choice(target, name, value, &["gini", "entropy"])? {
            "gini" => Ok(Criterion::Gini),
            _ => Ok(Criterion::Entropy),
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
        }
    }

    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth (None grows until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at random for each split (None = all)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sub-sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Sorted class labels seen during fit
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn class_index(&self, label: f64) -> usize {
        self.classes
            .iter()
            .position(|&c| (c - label).abs() < 1e-9)
            .unwrap_or(0)
    }

    fn class_counts(&self, y_idx: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[y_idx[i]] += 1;
        }
        counts
    }

    /// Majority class; ties resolve to the smallest label
    fn leaf_value(&self, counts: &[usize]) -> f64 {
        let mut best = 0;
        for (idx, &count) in counts.iter().enumerate() {
            if count > counts[best] {
                best = idx;
            }
        }
        self.classes.get(best).copied().unwrap_or(0.0)
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k > 0 && k < n_features => {
                let mut features = sample(rng, n_features, k).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..n_features).collect(),
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y_idx: &[usize],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y_idx, indices);
        let value = self.leaf_value(&counts);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        // Check stopping conditions
        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure;

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let impurity = self.criterion.impurity(&counts, n_samples);
        let features = self.candidate_features(x.ncols(), rng);

        match self.find_best_split(x, y_idx, indices, &features, &counts, impurity) {
            Some((feature_idx, threshold, gain)) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);

                importances[feature_idx] += n_samples as f64 * gain;

                let left = Box::new(self.build_tree(x, y_idx, &left_indices, depth + 1, importances, rng));
                let right = Box::new(self.build_tree(x, y_idx, &right_indices, depth + 1, importances, rng));

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                    impurity,
                }
            }
            None => TreeNode::Leaf { value, n_samples },
        }
    }

    /// Best (feature, threshold, gain) over the candidate features.
    ///
    /// Each feature is scanned once in sorted order, moving one sample at a
    /// time from the right partition to the left.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y_idx: &[usize],
        indices: &[usize],
        features: &[usize],
        parent_counts: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        let n_classes = parent_counts.len();

        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut column: Vec<(f64, usize)> = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], y_idx[i]))
                    .collect();
                column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

                let mut left = vec![0usize; n_classes];
                let mut right = parent_counts.to_vec();
                let mut best_gain = 0.0f64;
                let mut best_threshold = None;

                for pos in 0..n - 1 {
                    let (value, class) = column[pos];
                    left[class] += 1;
                    right[class] -= 1;

                    let next_value = column[pos + 1].0;
                    if next_value <= value {
                        continue;
                    }

                    let n_left = pos + 1;
                    let n_right = n - n_left;
                    if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (n_left as f64 * self.criterion.impurity(&left, n_left)
                        + n_right as f64 * self.criterion.impurity(&right, n_right))
                        / n as f64;
                    let gain = parent_impurity - weighted;
                    if gain > best_gain {
                        best_gain = gain;
                        best_threshold = Some((value + next_value) / 2.0);
                    }
                }

                best_threshold.map(|threshold| (feature_idx, threshold, best_gain))
            })
            .collect();

        // Strictly greater keeps the lowest feature index on ties
        feature_results
            .into_iter()
            .flatten()
            .fold(None, |best: Option<(usize, f64, f64)>, candidate| match best {
                Some(b) if b.2 >= candidate.2 => Some(b),
                _ => Some(candidate),
            })
    }

    fn predict_sample(&self, root: &TreeNode, sample: &[f64]) -> f64 {
        let mut node = root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn count_leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
            }
        }
        self.root.as_ref().map_or(0, count_leaves)
    }
}

impl Configurable for DecisionTree {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "criterion" => self.criterion = Criterion::from_param(TYPE_NAME, name, value)?,
            "max_depth" => self.max_depth = params::optional_usize(TYPE_NAME, name, value)?,
            "min_samples_split" => {
                self.min_samples_split = params::usize_at_least(TYPE_NAME, name, value, 2)?
            }
            "min_samples_leaf" => {
                self.min_samples_leaf = params::usize_at_least(TYPE_NAME, name, value, 1)?
            }
            "max_features" => self.max_features = params::optional_usize(TYPE_NAME, name, value)?,
            "random_state" => self.random_state = params::optional_u64(TYPE_NAME, name, value)?,
            _ => return Err(params::unknown_property(TYPE_NAME, name)),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "criterion" => Some(self.criterion.as_str().into()),
            "max_depth" => Some(self.max_depth.into()),
            "min_samples_split" => Some(self.min_samples_split.into()),
            "min_samples_leaf" => Some(self.min_samples_leaf.into()),
            "max_features" => Some(self.max_features.into()),
            "random_state" => Some(self.random_state.map(|s| s as i64).into()),
            _ => None,
        }
    }
}

impl Estimator for DecisionTree {
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
                "cannot fit a decision tree on zero samples".to_string(),
            ));
        }

        self.n_features = n_features;

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        classes.dedup();
        self.classes = classes;

        let y_idx: Vec<usize> = y.iter().map(|&v| self.class_index(v)).collect();
        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, &y_idx, &indices, 0, &mut importances, &mut rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(AutoMlError::ModelNotFitted)?;

        if x.ncols() != self.n_features {
            return Err(AutoMlError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let predictions: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| self.predict_sample(root, &row.to_vec()))
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn snapshot(&self) -> TrainedModel {
        TrainedModel::DecisionTreeClassifier(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 3);
        assert!(tree.get_n_leaves() >= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_set_param_max_depth() {
        let mut tree = DecisionTree::new();
        tree.set_param("max_depth", &ParamValue::Int(5)).unwrap();
        assert_eq!(tree.max_depth, Some(5));
        assert_eq!(tree.get_param("max_depth"), Some(ParamValue::Int(5)));

        tree.set_param("max_depth", &ParamValue::Null).unwrap();
        assert_eq!(tree.max_depth, None);
    }

    #[test]
    fn test_set_param_rejects_unknown_and_ill_typed() {
        let mut tree = DecisionTree::new();
        assert!(matches!(
            tree.set_param("depth", &ParamValue::Int(5)),
            Err(AutoMlError::PropertyApplication { .. })
        ));
        assert!(tree.set_param("criterion", &"mse".into()).is_err());
        assert!(tree.set_param("criterion", &"entropy".into()).is_ok());
        assert_eq!(tree.criterion, Criterion::Entropy);
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new();
        let x = array![[1.0]];
        assert!(matches!(tree.predict(&x), Err(AutoMlError::ModelNotFitted)));
    }
}
