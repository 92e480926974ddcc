//! Integration tests for the model factory: configuration, type resolution,
//! candidate search and threshold-gated selection

use creditcard_automl::error::AutoMlError;
use creditcard_automl::factory::{
    select_best, select_best_index, ModelFactory, ModelSearchConfig, SearchResult, TypeRegistry,
};
use creditcard_automl::training::{DecisionTree, Estimator, ParamValue, Params};
use ndarray::{Array1, Array2};

const CONFIG: &str = r#"
grid_search:
  module: model_selection
  class: GridSearchCV
  params:
    cv: 3
    verbose: 1
model_selection:
  module_0:
    module: tree
    class: DecisionTreeClassifier
    params:
      random_state: 0
    search_param_grid:
      max_depth: [1, 3]
      criterion: [gini, entropy]
  module_1:
    module: neighbors
    class: KNeighborsClassifier
    search_param_grid:
      n_neighbors: [3, 5]
  module_2:
    module: naive_bayes
    class: GaussianNB
    search_param_grid:
      var_smoothing: [0.000000001]
"#;

/// Two informative features; the label flips at row 30
fn dataset() -> (Array2<f64>, Array1<f64>) {
    let n = 60;
    let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
        0 => i as f64,
        _ => ((i * 7) % 11) as f64,
    });
    let y = Array1::from_shape_fn(n, |i| if i >= 30 { 1.0 } else { 0.0 });
    (x, y)
}

fn factory(yaml: &str) -> ModelFactory {
    ModelFactory::new(ModelSearchConfig::from_yaml_str(yaml).unwrap())
}

fn result_with_score(serial_id: &str, score: f64) -> SearchResult {
    SearchResult {
        serial_id: serial_id.to_string(),
        model_name: "tree.DecisionTreeClassifier".to_string(),
        estimator: Box::new(DecisionTree::new()),
        best_estimator: Box::new(DecisionTree::new()),
        best_params: Params::new(),
        best_score: score,
    }
}

// ============================================================================
// Type resolution and construction
// ============================================================================

#[test]
fn test_resolve_and_construct_with_override() {
    let registry = TypeRegistry::new();
    let handle = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();

    let mut overrides = Params::new();
    overrides.insert("max_depth".to_string(), ParamValue::Int(5));
    let model = registry.construct(&handle, &overrides).unwrap();

    assert_eq!(model.get_param("max_depth"), Some(ParamValue::Int(5)));
}

#[test]
fn test_unknown_namespace_fails_resolution() {
    let registry = TypeRegistry::new();
    let err = registry.resolve_type("sklearn.svm", "SVC").unwrap_err();
    assert!(matches!(err, AutoMlError::TypeResolution { ref namespace, .. } if namespace == "sklearn.svm"));
}

#[test]
fn test_unknown_candidate_type_aborts_initialization() {
    let yaml = CONFIG.replace("class: GaussianNB", "class: ComplementNB");
    let err = factory(&yaml).initialized_candidates().unwrap_err();
    assert!(matches!(err, AutoMlError::TypeResolution { ref type_name, .. } if type_name == "ComplementNB"));
}

#[test]
fn test_rejected_fixed_property_aborts_initialization() {
    let yaml = CONFIG.replace("random_state: 0", "n_estimators: 10");
    assert!(matches!(
        factory(&yaml).initialized_candidates(),
        Err(AutoMlError::PropertyApplication { ref property, .. }) if property == "n_estimators"
    ));
}

#[test]
fn test_candidate_missing_class_or_module() {
    let yaml = CONFIG.replace("    class: KNeighborsClassifier\n", "");
    assert!(matches!(
        ModelSearchConfig::from_yaml_str(&yaml),
        Err(AutoMlError::ConfigParse { ref key, .. }) if key == "model_selection.module_1.class"
    ));

    let yaml = CONFIG.replace("    module: naive_bayes\n", "");
    assert!(matches!(
        ModelSearchConfig::from_yaml_str(&yaml),
        Err(AutoMlError::ConfigParse { ref key, .. }) if key == "model_selection.module_2.module"
    ));
}

#[test]
fn test_initialized_candidates_keep_config_order() {
    let candidates = factory(CONFIG).initialized_candidates().unwrap();
    let ids: Vec<&str> = candidates.iter().map(|c| c.serial_id.as_str()).collect();
    assert_eq!(ids, vec!["module_0", "module_1", "module_2"]);
    assert_eq!(candidates[1].model_name, "neighbors.KNeighborsClassifier");
    assert_eq!(
        candidates[0].estimator.get_param("random_state"),
        Some(ParamValue::Int(0))
    );
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_search_all_preserves_order() {
    let (x, y) = dataset();
    let factory = factory(CONFIG);
    let candidates = factory.initialized_candidates().unwrap();
    let results = factory.search_all(&candidates, &x, &y).unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.serial_id.as_str()).collect();
    assert_eq!(ids, vec!["module_0", "module_1", "module_2"]);
    for result in &results {
        assert!(result.best_estimator.is_fitted());
        assert!(!result.estimator.is_fitted());
        assert!(result.best_score > 0.5 && result.best_score <= 1.0);
    }
    assert!(results[0].best_params.contains_key("max_depth"));
    assert!(results[0].best_params.contains_key("criterion"));
}

#[test]
fn test_parallel_search_matches_sequential() {
    let (x, y) = dataset();
    let factory = factory(CONFIG);
    let candidates = factory.initialized_candidates().unwrap();

    let sequential = factory.search_all(&candidates, &x, &y).unwrap();
    let parallel = factory.search_all_parallel(&candidates, &x, &y).unwrap();

    assert_eq!(sequential.len(), parallel.len());
    for (a, b) in sequential.iter().zip(&parallel) {
        assert_eq!(a.serial_id, b.serial_id);
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score, b.best_score);
    }
}

#[test]
fn test_failing_candidate_aborts_batch() {
    let (x, y) = dataset();
    let yaml = CONFIG.replace("n_neighbors: [3, 5]", "n_neighbors: [3, many]");
    let factory = factory(&yaml);
    let candidates = factory.initialized_candidates().unwrap();

    let err = factory.search_all(&candidates, &x, &y).unwrap_err();
    assert!(matches!(err, AutoMlError::CandidateSearch { ref serial_id, .. } if serial_id == "module_1"));

    let err = factory.search_all_parallel(&candidates, &x, &y).unwrap_err();
    assert!(matches!(err, AutoMlError::CandidateSearch { ref serial_id, .. } if serial_id == "module_1"));
}

#[test]
fn test_get_best_model() {
    let (x, y) = dataset();
    let selected = factory(CONFIG).get_best_model(&x, &y, 0.6).unwrap();

    assert!(selected.result.best_score > 0.6);
    assert!(selected.result.best_estimator.is_fitted());
    let pred = selected.result.best_estimator.predict(&x).unwrap();
    assert_eq!(pred.len(), y.len());
}

#[test]
fn test_get_best_model_unreachable_floor() {
    let (x, y) = dataset();
    let err = factory(CONFIG).get_best_model(&x, &y, 1.0).unwrap_err();
    assert!(matches!(err, AutoMlError::NoAcceptableModel { threshold } if threshold == 1.0));
}

#[test]
fn test_randomized_search_strategy() {
    let yaml = CONFIG
        .replace("class: GridSearchCV", "class: RandomizedSearchCV")
        .replace("verbose: 1", "n_iter: 2\n    random_state: 7");
    let (x, y) = dataset();
    let factory = factory(&yaml);
    let candidates = factory.initialized_candidates().unwrap();
    let results = factory.search_all(&candidates, &x, &y).unwrap();
    assert_eq!(results.len(), 3);
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_select_best_picks_maximum() {
    let results: Vec<SearchResult> = [0.5, 0.7, 0.65, 0.9, 0.3]
        .iter()
        .enumerate()
        .map(|(i, &s)| result_with_score(&format!("m{}", i), s))
        .collect();
    let selected = select_best(results, 0.6).unwrap();
    assert_eq!(selected.index, 3);
    assert_eq!(selected.result.serial_id, "m3");
}

#[test]
fn test_select_best_tie_keeps_first() {
    let results = vec![result_with_score("first", 0.7), result_with_score("second", 0.7)];
    let selected = select_best(results, 0.6).unwrap();
    assert_eq!(selected.result.serial_id, "first");
}

#[test]
fn test_select_best_all_below_floor() {
    let results = vec![result_with_score("a", 0.1), result_with_score("b", 0.2)];
    assert!(matches!(
        select_best(results, 0.6),
        Err(AutoMlError::NoAcceptableModel { .. })
    ));
}

#[test]
fn test_selection_invariant_to_floor() {
    let scores = [0.61, 0.83, 0.79, 0.95, 0.7];
    for floor in [0.0, 0.5, 0.6, 0.9] {
        assert_eq!(select_best_index(scores.iter().copied(), floor), Some(3));
    }
}
