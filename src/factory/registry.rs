//! Namespace/type registry for estimators and search strategies
//!
//! Configuration documents refer to types by `(namespace, type name)`. The
//! registry maps each pair to a zero-argument constructor; overrides are then
//! applied by property name through [`Configurable::set_params`].

use super::search::{GridSearchCV, RandomizedSearchCV, SearchStrategy};
use crate::error::{AutoMlError, Result};
use crate::training::{
    format_params, Configurable, DecisionTree, Estimator, GaussianNaiveBayes, KNNClassifier,
    LogisticRegression, ParamGrid, Params, RandomForest,
};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Builds an unfit estimator with default properties
pub type EstimatorConstructor = fn() -> Box<dyn Estimator>;

/// Builds a search strategy bound to an estimator and its grid
pub type StrategyConstructor = fn(Box<dyn Estimator>, ParamGrid) -> Box<dyn SearchStrategy>;

/// What a registered type builds
#[derive(Clone, Copy)]
pub enum TypeKind {
    Estimator(EstimatorConstructor),
    SearchStrategy(StrategyConstructor),
}

/// A resolved, constructible type
#[derive(Clone)]
pub struct TypeHandle {
    pub namespace: String,
    pub type_name: String,
    kind: TypeKind,
}

impl TypeHandle {
    /// `namespace.TypeName`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.type_name)
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_estimator(&self) -> bool {
        matches!(self.kind, TypeKind::Estimator(_))
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TypeKind::Estimator(_) => "estimator",
            TypeKind::SearchStrategy(_) => "search strategy",
        };
        f.debug_struct("TypeHandle")
            .field("namespace", &self.namespace)
            .field("type_name", &self.type_name)
            .field("kind", &kind)
            .finish()
    }
}

/// Registry of constructible types keyed by namespace, then type name
#[derive(Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, BTreeMap<String, TypeKind>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.types.iter().map(|(ns, types)| (ns, types.keys().collect::<Vec<_>>())))
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_estimator("linear_model", "LogisticRegression", || Box::new(LogisticRegression::new()))
            .register_estimator("tree", "DecisionTreeClassifier", || Box::new(DecisionTree::new()))
            .register_estimator("ensemble", "RandomForestClassifier", || Box::new(RandomForest::default()))
            .register_estimator("neighbors", "KNeighborsClassifier", || Box::new(KNNClassifier::default()))
            .register_estimator("naive_bayes", "GaussianNB", || Box::new(GaussianNaiveBayes::new()))
            .register_search_strategy("model_selection", "GridSearchCV", |estimator, grid| {
                Box::new(GridSearchCV::new(estimator, grid))
            })
            .register_search_strategy("model_selection", "RandomizedSearchCV", |estimator, grid| {
                Box::new(RandomizedSearchCV::new(estimator, grid))
            });
        registry
    }
}

impl TypeRegistry {
    /// Registry with the built-in estimators and search strategies
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    pub fn register_estimator(
        &mut self,
        namespace: &str,
        type_name: &str,
        constructor: EstimatorConstructor,
    ) -> &mut Self {
        self.insert(namespace, type_name, TypeKind::Estimator(constructor))
    }

    pub fn register_search_strategy(
        &mut self,
        namespace: &str,
        type_name: &str,
        constructor: StrategyConstructor,
    ) -> &mut Self {
        self.insert(namespace, type_name, TypeKind::SearchStrategy(constructor))
    }

    fn insert(&mut self, namespace: &str, type_name: &str, kind: TypeKind) -> &mut Self {
        self.types
            .entry(namespace.to_string())
            .or_default()
            .insert(type_name.to_string(), kind);
        self
    }

    /// Registered namespaces, sorted
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Type names registered under `namespace`, sorted
    pub fn type_names(&self, namespace: &str) -> Vec<&str> {
        self.types
            .get(namespace)
            .map(|types| types.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// `namespace.TypeName` of the first namespace registering estimator `type_name`
    pub fn qualified_name_of(&self, type_name: &str) -> Option<String> {
        self.types.iter().find_map(|(namespace, types)| match types.get(type_name) {
            Some(TypeKind::Estimator(_)) => Some(format!("{}.{}", namespace, type_name)),
            _ => None,
        })
    }

    /// Resolve `namespace.type_name`, failing if either part is unknown
    pub fn resolve_type(&self, namespace: &str, type_name: &str) -> Result<TypeHandle> {
        let kind = self
            .types
            .get(namespace)
            .and_then(|types| types.get(type_name))
            .copied()
            .ok_or_else(|| AutoMlError::TypeResolution {
                namespace: namespace.to_string(),
                type_name: type_name.to_string(),
            })?;

        Ok(TypeHandle {
            namespace: namespace.to_string(),
            type_name: type_name.to_string(),
            kind,
        })
    }

    /// Build an estimator and apply `overrides` to it
    pub fn construct(&self, handle: &TypeHandle, overrides: &Params) -> Result<Box<dyn Estimator>> {
        let TypeKind::Estimator(constructor) = handle.kind else {
            return Err(AutoMlError::ConfigError(format!(
                "{} is a search strategy, not an estimator",
                handle.qualified_name()
            )));
        };

        let mut instance = constructor();
        apply_overrides(instance.as_mut(), overrides)?;
        Ok(instance)
    }

    /// Build a search strategy around `estimator` and apply `overrides` to it
    pub fn construct_strategy(
        &self,
        handle: &TypeHandle,
        estimator: Box<dyn Estimator>,
        param_grid: ParamGrid,
        overrides: &Params,
    ) -> Result<Box<dyn SearchStrategy>> {
        let TypeKind::SearchStrategy(constructor) = handle.kind else {
            return Err(AutoMlError::ConfigError(format!(
                "{} is an estimator, not a search strategy",
                handle.qualified_name()
            )));
        };

        let mut instance = constructor(estimator, param_grid);
        apply_overrides(instance.as_mut(), overrides)?;
        Ok(instance)
    }
}

fn apply_overrides<T: Configurable + ?Sized>(instance: &mut T, overrides: &Params) -> Result<()> {
    if !overrides.is_empty() {
        debug!(
            target_type = instance.type_name(),
            params = %format_params(overrides),
            "Applying property overrides"
        );
    }
    instance.set_params(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ParamValue;

    #[test]
    fn test_resolve_known_type() {
        let registry = TypeRegistry::new();
        let handle = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();
        assert!(handle.is_estimator());
        assert_eq!(handle.qualified_name(), "tree.DecisionTreeClassifier");

        let model = registry.construct(&handle, &Params::new()).unwrap();
        assert_eq!(model.type_name(), "DecisionTreeClassifier");
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_resolve_unknown_namespace_and_type() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.resolve_type("svm", "SVC"),
            Err(AutoMlError::TypeResolution { .. })
        ));
        assert!(matches!(
            registry.resolve_type("tree", "ExtraTreeClassifier"),
            Err(AutoMlError::TypeResolution { .. })
        ));
    }

    #[test]
    fn test_construct_applies_overrides() {
        let registry = TypeRegistry::new();
        let handle = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();

        let mut overrides = Params::new();
        overrides.insert("max_depth".to_string(), ParamValue::Int(5));
        let model = registry.construct(&handle, &overrides).unwrap();

        assert_eq!(model.get_param("max_depth"), Some(ParamValue::Int(5)));
    }

    #[test]
    fn test_construct_rejects_unknown_property() {
        let registry = TypeRegistry::new();
        let handle = registry.resolve_type("naive_bayes", "GaussianNB").unwrap();

        let mut overrides = Params::new();
        overrides.insert("max_depth".to_string(), ParamValue::Int(5));
        assert!(matches!(
            registry.construct(&handle, &overrides),
            Err(AutoMlError::PropertyApplication { .. })
        ));
    }

    #[test]
    fn test_construct_rejects_out_of_range_counts() {
        let registry = TypeRegistry::new();
        let cases = [
            ("ensemble", "RandomForestClassifier", "n_estimators", ParamValue::Int(0)),
            ("ensemble", "RandomForestClassifier", "min_samples_split", ParamValue::Int(1)),
            ("ensemble", "RandomForestClassifier", "min_samples_leaf", ParamValue::Int(0)),
            ("ensemble", "RandomForestClassifier", "max_features", ParamValue::Int(0)),
            ("tree", "DecisionTreeClassifier", "min_samples_split", ParamValue::Int(0)),
            ("tree", "DecisionTreeClassifier", "min_samples_leaf", ParamValue::Int(0)),
            ("neighbors", "KNeighborsClassifier", "n_neighbors", ParamValue::Int(0)),
        ];

        for (namespace, type_name, property, value) in cases {
            let handle = registry.resolve_type(namespace, type_name).unwrap();
            let mut overrides = Params::new();
            overrides.insert(property.to_string(), value);
            let result = registry.construct(&handle, &overrides);
            assert!(
                matches!(result, Err(AutoMlError::PropertyApplication { property: ref p, .. }) if p == property),
                "{}.{} accepted {}",
                namespace,
                type_name,
                property
            );
        }

        // The smallest legal value is kept as given
        let handle = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();
        let mut overrides = Params::new();
        overrides.insert("min_samples_split".to_string(), ParamValue::Int(2));
        let tree = registry.construct(&handle, &overrides).unwrap();
        assert_eq!(tree.get_param("min_samples_split"), Some(ParamValue::Int(2)));
    }

    #[test]
    fn test_randomized_search_rejects_zero_iterations() {
        let registry = TypeRegistry::new();
        let tree = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();
        let search = registry.resolve_type("model_selection", "RandomizedSearchCV").unwrap();

        let mut overrides = Params::new();
        overrides.insert("n_iter".to_string(), ParamValue::Int(0));
        let estimator = registry.construct(&tree, &Params::new()).unwrap();
        assert!(matches!(
            registry.construct_strategy(&search, estimator, ParamGrid::new(), &overrides),
            Err(AutoMlError::PropertyApplication { ref property, .. }) if property == "n_iter"
        ));

        overrides.insert("n_iter".to_string(), ParamValue::Int(3));
        let estimator = registry.construct(&tree, &Params::new()).unwrap();
        let strategy = registry
            .construct_strategy(&search, estimator, ParamGrid::new(), &overrides)
            .unwrap();
        assert_eq!(strategy.get_param("n_iter"), Some(ParamValue::Int(3)));
    }

    #[test]
    fn test_qualified_name_of_registered_estimator() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.qualified_name_of("DecisionTreeClassifier").as_deref(),
            Some("tree.DecisionTreeClassifier")
        );
        assert_eq!(
            registry.qualified_name_of("GaussianNB").as_deref(),
            Some("naive_bayes.GaussianNB")
        );
        // Search strategies and unknown names have no estimator entry
        assert!(registry.qualified_name_of("GridSearchCV").is_none());
        assert!(TypeRegistry::empty().qualified_name_of("DecisionTreeClassifier").is_none());
    }

    #[test]
    fn test_kind_mismatch() {
        let registry = TypeRegistry::new();
        let strategy = registry.resolve_type("model_selection", "GridSearchCV").unwrap();
        assert!(registry.construct(&strategy, &Params::new()).is_err());

        let tree = registry.resolve_type("tree", "DecisionTreeClassifier").unwrap();
        let estimator = registry.construct(&tree, &Params::new()).unwrap();
        assert!(registry
            .construct_strategy(&tree, estimator, ParamGrid::new(), &Params::new())
            .is_err());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = TypeRegistry::empty();
        registry.register_estimator("custom", "Stump", || Box::new(DecisionTree::new().with_max_depth(1)));

        assert_eq!(registry.namespaces().collect::<Vec<_>>(), vec!["custom"]);
        assert_eq!(registry.type_names("custom"), vec!["Stump"]);
        let handle = registry.resolve_type("custom", "Stump").unwrap();
        let model = registry.construct(&handle, &Params::new()).unwrap();
        assert_eq!(model.get_param("max_depth"), Some(ParamValue::Int(1)));
    }
}
