//! K-Nearest Neighbors classifier
//!
//! Stores the training set and classifies by a (optionally distance-weighted)
//! vote among the k closest rows under the Minkowski metric of order `p`.

use super::models::{Configurable, Estimator, TrainedModel};
use super::params::{self, ParamValue};
use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

const TYPE_NAME: &str = "KNeighborsClassifier";

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl WeightScheme {
    fn as_str(&self) -> &'static str {
        match self {
            WeightScheme::Uniform => "uniform",
            WeightScheme::Distance => "distance",
        }
    }

    fn weight(&self, dist: f64) -> f64 {
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Weighting scheme
    pub weights: WeightScheme,
    /// Minkowski order (1 = Manhattan, 2 = Euclidean)
    pub p: f64,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Default for KNNClassifier {
    fn default() -> Self {
        Self::with_k(5)
    }
}

impl KNNClassifier {
    /// Create with specified k, uniform weights and Euclidean distance
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            weights: WeightScheme::Uniform,
            p: 2.0,
            x_train: None,
            y_train: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_p(mut self, p: f64) -> Self {
        self.p = p;
        self
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances)
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    p: f64,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, &label) in x_train.rows().into_iter().zip(y_train.iter()) {
        let dist = minkowski(point, row, p);
        if heap.len() < k {
            heap.push(DistLabel(dist, label));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, label));
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn minkowski(a: ArrayView1<f64>, b: ArrayView1<f64>, p: f64) -> f64 {
    if (p - 2.0).abs() < f64::EPSILON {
        return a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt();
    }
    if (p - 1.0).abs() < f64::EPSILON {
        return a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum();
    }
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| (ai - bi).abs().powf(p))
        .sum::<f64>()
        .powf(1.0 / p)
}

/// Weighted majority vote; ties resolve to the smallest class
fn vote_classify(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut votes: BTreeMap<i64, f64> = BTreeMap::new();
    for &(dist, label) in neighbors {
        *votes.entry(label.round() as i64).or_insert(0.0) += weights.weight(dist);
    }

    let mut winner: Option<(i64, f64)> = None;
    for (label, weight) in votes {
        match winner {
            Some((_, best)) if best >= weight => {}
            _ => winner = Some((label, weight)),
        }
    }
    winner.map_or(0.0, |(label, _)| label as f64)
}

impl Configurable for KNNClassifier {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.n_neighbors = params::usize_at_least(TYPE_NAME, name, value, 1)?,
            "weights" => {
                self.weights = match params::choice(TYPE_NAME, name, value, &["uniform", "distance"])? {
                    "uniform" => WeightScheme::Uniform,
                    _ => WeightScheme::Distance,
                }
            }
            "p" => self.p = params::positive_f64(TYPE_NAME, name, value)?,
            _ => return Err(params::unknown_property(TYPE_NAME, name)),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "n_neighbors" => Some(self.n_neighbors.into()),
            "weights" => Some(self.weights.as_str().into()),
            "p" => Some(self.p.into()),
            _ => None,
        }
    }
}

impl Estimator for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AutoMlError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(AutoMlError::ValidationError(
                "cannot fit nearest neighbors on zero samples".to_string(),
            ));
        }

        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// Predict class labels (parallelized over test samples)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x_train), Some(y_train)) => (x_train, y_train),
            _ => return Err(AutoMlError::ModelNotFitted),
        };

        if x.ncols() != x_train.ncols() {
            return Err(AutoMlError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let k = self.n_neighbors;
        let p = self.p;
        let weights = self.weights;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, p);
                vote_classify(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn snapshot(&self) -> TrainedModel {
        TrainedModel::KNeighborsClassifier(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((20, 2), vec![
            // Class 0 (low values)
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            // Class 1 (high values)
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();

        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ]);

        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let accuracy = knn.score(&x, &y).unwrap();
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);
    }

    #[test]
    fn test_minkowski_orders() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((minkowski(a.view(), b.view(), 2.0) - 5.0).abs() < 1e-12);
        assert!((minkowski(a.view(), b.view(), 1.0) - 7.0).abs() < 1e-12);
        assert!((minkowski(a.view(), b.view(), 3.0) - 91f64.powf(1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_knn() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::with_k(5).with_weights(WeightScheme::Distance);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_vote_tie_goes_to_smallest_class() {
        let neighbors = vec![(1.0, 1.0), (1.0, 0.0)];
        assert_eq!(vote_classify(&neighbors, WeightScheme::Uniform), 0.0);
    }

    #[test]
    fn test_params() {
        let mut knn = KNNClassifier::default();
        knn.set_param("n_neighbors", &ParamValue::Int(7)).unwrap();
        knn.set_param("weights", &"distance".into()).unwrap();
        knn.set_param("p", &ParamValue::Int(1)).unwrap();

        assert_eq!(knn.get_param("n_neighbors"), Some(ParamValue::Int(7)));
        assert_eq!(knn.weights, WeightScheme::Distance);
        assert_eq!(knn.p, 1.0);
        assert!(knn.set_param("n_neighbors", &ParamValue::Int(0)).is_err());
        assert!(knn.set_param("metric", &"cosine".into()).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = KNNClassifier::default();
        assert!(matches!(knn.predict(&array![[1.0, 2.0]]), Err(AutoMlError::ModelNotFitted)));
    }
}
