//! Integration tests for held-out evaluation and its acceptance rule

use creditcard_automl::error::AutoMlError;
use creditcard_automl::evaluation::{evaluate, ModelEvaluator, ZeroDivisionPolicy};
use creditcard_automl::training::{DecisionTree, Estimator};
use ndarray::{Array1, Array2};

/// One feature, label 1 from row `n / 2` on
fn separable(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
    let y = Array1::from_shape_fn(n, |i| if i >= n / 2 { 1.0 } else { 0.0 });
    (x, y)
}

/// Copy of `y` with the first `k` labels flipped
fn flip_first(y: &Array1<f64>, k: usize) -> Array1<f64> {
    let mut flipped = y.clone();
    for v in flipped.iter_mut().take(k) {
        *v = 1.0 - *v;
    }
    flipped
}

fn fitted_tree(x: &Array2<f64>, y: &Array1<f64>) -> Box<dyn Estimator> {
    let mut tree = DecisionTree::new();
    tree.fit(x, y).unwrap();
    Box::new(tree)
}

#[test]
fn test_perfect_model_scores_one_everywhere() {
    let (x, y) = separable(20);
    let models = vec![fitted_tree(&x, &y)];

    let record = evaluate(&models, &x, &y, &x, &y, 0.6).unwrap().unwrap();
    let m = &record.metrics;
    assert_eq!(m.train_accuracy, 1.0);
    assert_eq!(m.test_accuracy, 1.0);
    assert_eq!(m.model_accuracy, 1.0);
    assert_eq!(m.accuracy_gap, 0.0);
    assert_eq!(m.recall, 1.0);
    assert_eq!(m.precision, 1.0);
    assert_eq!(m.f1, 1.0);
    assert_eq!(m.confusion_matrix.false_positives, 0);
    assert_eq!(m.confusion_matrix.false_negatives, 0);
    assert_eq!(m.index, 0);
    assert_eq!(m.model_name, "tree.DecisionTreeClassifier");
}

#[test]
fn test_gap_of_ten_points_rejected() {
    let (x, y) = separable(20);
    let models = vec![fitted_tree(&x, &y)];
    // 2 of 20 wrong: test accuracy 0.9, gap 0.10, blended accuracy ~0.947
    let y_test = flip_first(&y, 2);

    let metrics = ModelEvaluator::new()
        .measure(models[0].as_ref(), 0, &x, &y, &x, &y_test)
        .unwrap();
    assert!((metrics.accuracy_gap - 0.10).abs() < 1e-12);
    assert!(metrics.model_accuracy > 0.6);

    assert!(evaluate(&models, &x, &y, &x, &y_test, 0.6).unwrap().is_none());
}

#[test]
fn test_small_gap_accepted() {
    let (x, y) = separable(40);
    let models = vec![fitted_tree(&x, &y)];
    // 1 of 40 wrong: gap 0.025
    let y_test = flip_first(&y, 1);

    let record = evaluate(&models, &x, &y, &x, &y_test, 0.6).unwrap().unwrap();
    assert!((record.metrics.test_accuracy - 0.975).abs() < 1e-12);
}

#[test]
fn test_equal_later_model_does_not_replace_winner() {
    let (x, y) = separable(20);
    let models = vec![fitted_tree(&x, &y), fitted_tree(&x, &y)];

    let record = evaluate(&models, &x, &y, &x, &y, 0.6).unwrap().unwrap();
    assert_eq!(record.metrics.index, 0);
}

#[test]
fn test_better_later_model_wins() {
    let (x, y) = separable(40);
    // Memorises one wrong label: 0.975 on both splits
    let noisy = fitted_tree(&x, &flip_first(&y, 1));
    let models = vec![noisy, fitted_tree(&x, &y)];

    let first = ModelEvaluator::new()
        .measure(models[0].as_ref(), 0, &x, &y, &x, &y)
        .unwrap();
    assert!((first.model_accuracy - 0.975).abs() < 1e-12);

    let record = evaluate(&models, &x, &y, &x, &y, 0.6).unwrap().unwrap();
    assert_eq!(record.metrics.index, 1);
    assert_eq!(record.metrics.model_accuracy, 1.0);
}

#[test]
fn test_nothing_qualifies_returns_none() {
    let (x, y) = separable(20);
    let models = vec![fitted_tree(&x, &y)];
    // blended accuracy 1.0 never exceeds a floor of 1.0
    assert!(evaluate(&models, &x, &y, &x, &y, 1.0).unwrap().is_none());
    assert!(evaluate(&[], &x, &y, &x, &y, 0.6).unwrap().is_none());
}

#[test]
fn test_zero_division_policies() {
    let (x, y) = separable(20);
    let all_negative = Array1::zeros(20);
    let models = vec![fitted_tree(&x, &all_negative)];

    // The model never predicts a positive, so precision has no denominator
    let metrics = ModelEvaluator::new()
        .measure(models[0].as_ref(), 0, &x, &all_negative, &x, &y)
        .unwrap();
    assert_eq!(metrics.precision, 0.0);
    assert_eq!(metrics.recall, 0.0);
    assert_eq!(metrics.f1, 0.0);

    let strict = ModelEvaluator::new().with_zero_division(ZeroDivisionPolicy::Strict);
    assert!(matches!(
        strict.evaluate(&models, &x, &all_negative, &x, &y),
        Err(AutoMlError::DegenerateMetric { .. })
    ));
}

#[test]
fn test_custom_gap_limit() {
    let (x, y) = separable(20);
    let models = vec![fitted_tree(&x, &y)];
    let y_test = flip_first(&y, 2);

    let record = ModelEvaluator::new()
        .with_max_accuracy_gap(0.2)
        .evaluate(&models, &x, &y, &x, &y_test)
        .unwrap();
    assert!(record.is_some());
}
