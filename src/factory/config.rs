//! Model search configuration
//!
//! The document has two sections: `grid_search` names the search strategy
//! and the properties applied to every strategy instance, and
//! `model_selection` maps candidate serial ids to the estimator type, its
//! fixed properties and the hyperparameter grid to search.
//!
//! ```yaml
//! grid_search:
//!   module: model_selection
//!   class: GridSearchCV
//!   params: { cv: 5, verbose: 2 }
//! model_selection:
//!   module_0:
//!     module: tree
//!     class: DecisionTreeClassifier
//!     params: { random_state: 42 }
//!     search_param_grid:
//!       max_depth: [3, 5, null]
//! ```

use crate::error::{AutoMlError, Result};
use crate::training::{ParamGrid, ParamValue, Params};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const GRID_SEARCH_KEY: &str = "grid_search";
const MODEL_SELECTION_KEY: &str = "model_selection";
const MODULE_KEY: &str = "module";
const CLASS_KEY: &str = "class";
const PARAM_KEY: &str = "params";
const SEARCH_PARAM_GRID_KEY: &str = "search_param_grid";

/// The search algorithm and the overrides applied to every instance of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategySpec {
    pub namespace: String,
    pub type_name: String,
    pub params: Params,
}

/// One configured model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// Unique key within the configuration
    pub serial_id: String,
    pub namespace: String,
    pub type_name: String,
    /// Properties applied right after construction
    pub params: Params,
    /// Hyperparameters explored by the search strategy
    pub search_param_grid: ParamGrid,
}

impl CandidateSpec {
    /// `namespace.TypeName`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.type_name)
    }
}

/// A parsed model search configuration; candidates keep document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSearchConfig {
    pub search_strategy: SearchStrategySpec,
    pub candidates: Vec<CandidateSpec>,
}

impl ModelSearchConfig {
    /// Load from a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AutoMlError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(text)
            .map_err(|e| AutoMlError::config_parse("<document>", e.to_string()))?;
        let root = as_mapping(&document, "<document>")?;

        let strategy_section = as_mapping(required(root, GRID_SEARCH_KEY, "")?, GRID_SEARCH_KEY)?;
        let search_strategy = SearchStrategySpec {
            namespace: required_str(strategy_section, MODULE_KEY, GRID_SEARCH_KEY)?,
            type_name: required_str(strategy_section, CLASS_KEY, GRID_SEARCH_KEY)?,
            params: optional_params(strategy_section, GRID_SEARCH_KEY)?,
        };

        let selection = as_mapping(required(root, MODEL_SELECTION_KEY, "")?, MODEL_SELECTION_KEY)?;
        let mut candidates = Vec::with_capacity(selection.len());
        for (key, body) in selection {
            let serial_id = scalar_key(key, MODEL_SELECTION_KEY)?;
            let path = format!("{}.{}", MODEL_SELECTION_KEY, serial_id);
            let body = as_mapping(body, &path)?;

            candidates.push(CandidateSpec {
                namespace: required_str(body, MODULE_KEY, &path)?,
                type_name: required_str(body, CLASS_KEY, &path)?,
                params: optional_params(body, &path)?,
                search_param_grid: param_grid(body, &path)?,
                serial_id,
            });
        }

        Ok(Self {
            search_strategy,
            candidates,
        })
    }

    /// Look up a candidate by serial id
    pub fn candidate(&self, serial_id: &str) -> Option<&CandidateSpec> {
        self.candidates.iter().find(|c| c.serial_id == serial_id)
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn as_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| AutoMlError::config_parse(path, "expected a mapping"))
}

fn required<'a>(map: &'a Mapping, key: &str, parent: &str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| AutoMlError::config_parse(join(parent, key), "missing required key"))
}

fn required_str(map: &Mapping, key: &str, parent: &str) -> Result<String> {
    required(map, key, parent)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AutoMlError::config_parse(join(parent, key), "expected a string"))
}

fn scalar_key(key: &Value, parent: &str) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(AutoMlError::config_parse(parent, "candidate ids must be scalars")),
    }
}

/// `params` may be absent or null; otherwise it must map names to scalars
fn optional_params(map: &Mapping, parent: &str) -> Result<Params> {
    let path = join(parent, PARAM_KEY);
    match map.get(PARAM_KEY) {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(value) => {
            let params = as_mapping(value, &path)?;
            let mut out = Params::new();
            for (name, raw) in params {
                let name = scalar_key(name, &path)?;
                out.insert(name.clone(), scalar(raw, &join(&path, &name))?);
            }
            Ok(out)
        }
    }
}

fn param_grid(map: &Mapping, parent: &str) -> Result<ParamGrid> {
    let path = join(parent, SEARCH_PARAM_GRID_KEY);
    let grid = as_mapping(required(map, SEARCH_PARAM_GRID_KEY, parent)?, &path)?;

    let mut out = ParamGrid::new();
    for (name, raw) in grid {
        let name = scalar_key(name, &path)?;
        let entry_path = join(&path, &name);
        let values = raw
            .as_sequence()
            .ok_or_else(|| AutoMlError::config_parse(&entry_path, "expected a list of values"))?;
        let values = values
            .iter()
            .map(|v| scalar(v, &entry_path))
            .collect::<Result<Vec<_>>>()?;
        out.insert(name, values);
    }
    Ok(out)
}

fn scalar(value: &Value, path: &str) -> Result<ParamValue> {
    serde_yaml::from_value(value.clone())
        .map_err(|_| AutoMlError::config_parse(path, "expected a scalar value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
grid_search:
  module: model_selection
  class: GridSearchCV
  params:
    cv: 3
    verbose: 2
model_selection:
  module_1:
    module: tree
    class: DecisionTreeClassifier
    search_param_grid:
      max_depth: [2, 4]
  module_0:
    module: ensemble
    class: RandomForestClassifier
    params:
      random_state: 42
    search_param_grid:
      n_estimators: [10]
      max_features: [sqrt, null]
"#;

    #[test]
    fn test_parse_keeps_document_order() {
        let config = ModelSearchConfig::from_yaml_str(DOC).unwrap();

        assert_eq!(config.search_strategy.type_name, "GridSearchCV");
        assert_eq!(config.search_strategy.params["cv"], ParamValue::Int(3));

        let ids: Vec<&str> = config.candidates.iter().map(|c| c.serial_id.as_str()).collect();
        assert_eq!(ids, vec!["module_1", "module_0"]);

        let forest = config.candidate("module_0").unwrap();
        assert_eq!(forest.qualified_name(), "ensemble.RandomForestClassifier");
        assert_eq!(forest.params["random_state"], ParamValue::Int(42));
        assert_eq!(
            forest.search_param_grid["max_features"],
            vec![ParamValue::Str("sqrt".to_string()), ParamValue::Null]
        );
        assert!(config.candidate("module_1").unwrap().params.is_empty());
    }

    #[test]
    fn test_missing_strategy_class() {
        let doc = "grid_search:\n  module: model_selection\nmodel_selection: {}\n";
        let err = ModelSearchConfig::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, AutoMlError::ConfigParse { ref key, .. } if key == "grid_search.class"));
    }

    #[test]
    fn test_missing_grid() {
        let doc = "grid_search: {module: model_selection, class: GridSearchCV}\nmodel_selection:\n  m0: {module: tree, class: DecisionTreeClassifier}\n";
        let err = ModelSearchConfig::from_yaml_str(doc).unwrap_err();
        assert!(matches!(
            err,
            AutoMlError::ConfigParse { ref key, .. } if key == "model_selection.m0.search_param_grid"
        ));
    }

    #[test]
    fn test_non_mapping_params() {
        let doc = "grid_search: {module: model_selection, class: GridSearchCV, params: [1, 2]}\nmodel_selection: {}\n";
        let err = ModelSearchConfig::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, AutoMlError::ConfigParse { ref key, .. } if key == "grid_search.params"));
    }

    #[test]
    fn test_model_selection_not_a_mapping() {
        let doc = "grid_search: {module: model_selection, class: GridSearchCV}\nmodel_selection: [a, b]\n";
        assert!(matches!(
            ModelSearchConfig::from_yaml_str(doc),
            Err(AutoMlError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_grid_entry_must_be_list() {
        let doc = "grid_search: {module: model_selection, class: GridSearchCV}\nmodel_selection:\n  m0:\n    module: tree\n    class: DecisionTreeClassifier\n    search_param_grid: {max_depth: 3}\n";
        let err = ModelSearchConfig::from_yaml_str(doc).unwrap_err();
        assert!(matches!(
            err,
            AutoMlError::ConfigParse { ref key, .. } if key == "model_selection.m0.search_param_grid.max_depth"
        ));
    }
}
