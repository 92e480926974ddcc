//! Standard scaling of DataFrame columns

use crate::error::{AutoMlError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fitted statistics of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: f64,
    /// Population standard deviation; 1.0 for constant columns
    pub std: f64,
}

/// Z-score scaler: `(x - mean) / std` per column.
///
/// Columns must be `Float64`. Nulls pass through unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    params: BTreeMap<String, ScalerParams>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn mean and standard deviation of `columns`
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        let mut params = BTreeMap::new();
        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| AutoMlError::FeatureNotFound(col_name.to_string()))?;
            let series = column.as_materialized_series();
            params.insert(col_name.to_string(), Self::compute_params(series)?);
        }

        self.params = params;
        self.is_fitted = true;
        Ok(self)
    }

    /// Scale every fitted column present in `df`
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(AutoMlError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .params
            .iter()
            .map(|(col_name, params)| {
                let column = df
                    .column(col_name)
                    .map_err(|_| AutoMlError::FeatureNotFound(col_name.clone()))?;
                Self::scale_series(column.as_materialized_series(), params)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result = result.with_column(scaled)?.clone();
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fitted statistics of `column`
    pub fn params(&self, column: &str) -> Option<ScalerParams> {
        self.params.get(column).copied()
    }

    fn compute_params(series: &Series) -> Result<ScalerParams> {
        let ca = series.f64()?;
        let mean = ca.mean().unwrap_or(0.0);
        let std = ca.std(0).unwrap_or(1.0);
        Ok(ScalerParams {
            mean,
            std: if std == 0.0 || !std.is_finite() { 1.0 } else { std },
        })
    }

    fn scale_series(series: &Series, params: &ScalerParams) -> Result<Series> {
        let ca = series.f64()?;
        let scaled: Float64Chunked = ca
            .into_iter()
            .map(|opt| opt.map(|v| (v - params.mean) / params.std))
            .collect();
        Ok(scaled.with_name(series.name().clone()).into_series())
    }
}
