//! Dataset schema: expected columns and the roles columns play downstream

use crate::error::{AutoMlError, Result};
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Logical column type as written in the schema file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int64")]
    Int,
    #[serde(alias = "float64")]
    Float,
    #[serde(alias = "object", alias = "string")]
    Str,
}

impl ColumnType {
    /// Whether a polars dtype satisfies this column type
    pub fn matches(&self, dtype: &DataType) -> bool {
        match self {
            ColumnType::Int => dtype.is_integer(),
            ColumnType::Float => dtype.is_float(),
            ColumnType::Str => matches!(dtype, DataType::String),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
}

fn default_value_map() -> BTreeMap<i64, f64> {
    BTreeMap::from([(2, 0.0), (1, 1.0)])
}

/// Parsed schema file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// Every column of the raw dataset, in file order
    pub columns: Vec<ColumnSpec>,
    pub target_column: String,
    /// Identifier column removed before training
    pub column_to_drop: String,
    /// Categorical column whose codes are rewritten with `value_map`
    pub column_to_remap: String,
    #[serde(default = "default_value_map")]
    pub value_map: BTreeMap<i64, f64>,
    /// Columns Box-Cox transformed towards a normal distribution
    #[serde(default)]
    pub normal_distribution_columns: Vec<String>,
    /// Input columns of the preprocessing pipeline; every non-target column when empty
    #[serde(default)]
    pub feature_columns: Vec<String>,
}

impl DatasetSchema {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AutoMlError::ConfigError(format!("cannot read schema {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let schema: Self = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check that every referenced column is declared
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(AutoMlError::ConfigError("schema declares no columns".to_string()));
        }

        let referenced = std::iter::once(&self.target_column)
            .chain(std::iter::once(&self.column_to_drop))
            .chain(std::iter::once(&self.column_to_remap))
            .chain(&self.normal_distribution_columns)
            .chain(&self.feature_columns);
        for name in referenced {
            if self.column(name).is_none() {
                return Err(AutoMlError::ConfigError(format!(
                    "schema references undeclared column `{}`",
                    name
                )));
            }
        }
        if self.feature_columns.contains(&self.target_column) {
            return Err(AutoMlError::ConfigError(format!(
                "target column `{}` listed as a feature",
                self.target_column
            )));
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Feature columns, defaulting to every declared column except the target
    pub fn input_columns(&self) -> Vec<String> {
        if !self.feature_columns.is_empty() {
            return self.feature_columns.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.name != self.target_column)
            .map(|c| c.name.clone())
            .collect()
    }
}
