//! Hyperparameter values, property maps and search grids
//!
//! Property overrides and hyperparameter grids arrive from the model
//! configuration document as loosely typed scalars. [`ParamValue`] carries them
//! until an estimator or search strategy converts them with the typed helpers
//! below, which report a `PropertyApplication` error naming the target type and
//! the offending property.

use crate::error::{AutoMlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar property value from the configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Explicit "no value" (e.g. unlimited depth)
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Get as float (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as integer (floats with no fractional part narrow)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Property name to value, applied in key order
pub type Params = BTreeMap<String, ParamValue>;

/// Hyperparameter name to the candidate values explored by a search
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// Render a parameter map as `{a: 1, b: "gini"}` for log lines
pub fn format_params(params: &Params) -> String {
    let body: Vec<String> = params.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    format!("{{{}}}", body.join(", "))
}

/// Expand a grid into every parameter combination.
///
/// Keys are visited in sorted order and the last key varies fastest, so the
/// expansion order is stable for a given grid. An empty grid yields a single
/// empty combination.
pub fn expand_grid(grid: &ParamGrid) -> Result<Vec<Params>> {
    let mut combinations: Vec<Params> = vec![Params::new()];

    for (name, values) in grid {
        if values.is_empty() {
            return Err(AutoMlError::ValidationError(format!(
                "parameter grid entry `{}` has no values to search",
                name
            )));
        }

        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for combo in &combinations {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    Ok(combinations)
}

/// Error for a property the target type does not have
pub fn unknown_property(target: &str, name: &str) -> AutoMlError {
    AutoMlError::PropertyApplication {
        target: target.to_string(),
        property: name.to_string(),
        reason: "is not a property of this type".to_string(),
    }
}

fn rejected(target: &str, name: &str, expected: &str, value: &ParamValue) -> AutoMlError {
    AutoMlError::PropertyApplication {
        target: target.to_string(),
        property: name.to_string(),
        reason: format!("expects {}, got {}", expected, value),
    }
}

pub(crate) fn usize_value(target: &str, name: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_i64()
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| rejected(target, name, "a non-negative integer", value))
}

/// Integer property with a lower bound
pub(crate) fn usize_at_least(target: &str, name: &str, value: &ParamValue, min: usize) -> Result<usize> {
    let v = usize_value(target, name, value)?;
    if v >= min {
        Ok(v)
    } else {
        Err(rejected(target, name, &format!("an integer >= {}", min), value))
    }
}

pub(crate) fn optional_usize(target: &str, name: &str, value: &ParamValue) -> Result<Option<usize>> {
    if value.is_null() {
        return Ok(None);
    }
    usize_value(target, name, value).map(Some)
}

pub(crate) fn optional_u64(target: &str, name: &str, value: &ParamValue) -> Result<Option<u64>> {
    optional_usize(target, name, value).map(|v| v.map(|n| n as u64))
}

pub(crate) fn i64_value(target: &str, name: &str, value: &ParamValue) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| rejected(target, name, "an integer", value))
}

pub(crate) fn f64_value(target: &str, name: &str, value: &ParamValue) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| rejected(target, name, "a number", value))
}

pub(crate) fn positive_f64(target: &str, name: &str, value: &ParamValue) -> Result<f64> {
    let v = f64_value(target, name, value)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(rejected(target, name, "a positive number", value))
    }
}

pub(crate) fn bool_value(target: &str, name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| rejected(target, name, "a boolean", value))
}

/// Match a string property against its allowed spellings
pub(crate) fn choice<'a>(
    target: &str,
    name: &str,
    value: &ParamValue,
    allowed: &[&'a str],
) -> Result<&'a str> {
    let expected = format!("one of {:?}", allowed);
    let given = value
        .as_str()
        .ok_or_else(|| rejected(target, name, &expected, value))?;
    allowed
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(given))
        .ok_or_else(|| rejected(target, name, &expected, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_values_from_yaml() {
        let grid: ParamGrid =
            serde_yaml::from_str("max_depth: [3, null]\ncriterion: [gini]\nC: [0.5, 1]\nbootstrap: [true]")
                .unwrap();
        assert_eq!(grid["max_depth"], vec![ParamValue::Int(3), ParamValue::Null]);
        assert_eq!(grid["criterion"], vec![ParamValue::Str("gini".to_string())]);
        assert_eq!(grid["C"], vec![ParamValue::Float(0.5), ParamValue::Int(1)]);
        assert_eq!(grid["bootstrap"], vec![ParamValue::Bool(true)]);
    }

    #[test]
    fn test_expand_grid_cartesian_product() {
        let mut grid = ParamGrid::new();
        grid.insert("a".to_string(), vec![1usize.into(), 2usize.into()]);
        grid.insert("b".to_string(), vec!["x".into(), "y".into(), "z".into()]);

        let combos = expand_grid(&grid).unwrap();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0]["a"], ParamValue::Int(1));
        assert_eq!(combos[0]["b"], ParamValue::Str("x".to_string()));
        assert_eq!(combos[1]["b"], ParamValue::Str("y".to_string()));
        assert_eq!(combos[5]["a"], ParamValue::Int(2));
    }

    #[test]
    fn test_expand_empty_grid() {
        let combos = expand_grid(&ParamGrid::new()).unwrap();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn test_expand_grid_rejects_empty_values() {
        let mut grid = ParamGrid::new();
        grid.insert("a".to_string(), Vec::new());
        assert!(expand_grid(&grid).is_err());
    }

    #[test]
    fn test_typed_conversions() {
        assert_eq!(usize_value("T", "n", &ParamValue::Float(4.0)).unwrap(), 4);
        assert!(usize_value("T", "n", &ParamValue::Int(-1)).is_err());
        assert_eq!(optional_usize("T", "n", &ParamValue::Null).unwrap(), None);
        assert_eq!(choice("T", "c", &"GINI".into(), &["gini", "entropy"]).unwrap(), "gini");

        let err = bool_value("T", "flag", &ParamValue::Int(1)).unwrap_err();
        assert!(matches!(err, AutoMlError::PropertyApplication { ref property, .. } if property == "flag"));
    }
}
