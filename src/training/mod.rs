//! Estimators searched by the model factory
//!
//! Binary classifiers, each configurable by property name:
//! - Logistic regression
//! - Decision trees and Random Forests
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes
//!
//! plus the stratified K-fold splitter used by the search strategies.

mod models;
pub mod params;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod knn;
pub mod naive_bayes;

pub use models::{accuracy_score, Configurable, ConfusionMatrix, Estimator, TrainedModel};
pub use params::{expand_grid, format_params, ParamGrid, ParamValue, Params};
pub use cross_validation::{CrossValidator, CVStrategy, CVSplit, CVResults};
pub use linear_models::LogisticRegression;
pub use decision_tree::{DecisionTree, TreeNode, Criterion};
pub use random_forest::{RandomForest, MaxFeatures};
pub use knn::{KNNClassifier, WeightScheme};
pub use naive_bayes::GaussianNaiveBayes;
