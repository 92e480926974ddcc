//! Dataset-specific feature generation: drop, remap and Box-Cox normalize

use super::cast_numeric_to_f64;
use crate::error::{AutoMlError, Result};
use crate::schema::DatasetSchema;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lambda search interval
const LAMBDA_MIN: f64 = -5.0;
const LAMBDA_MAX: f64 = 5.0;
const LAMBDA_GRID_STEP: f64 = 0.1;
const GOLDEN_TOL: f64 = 1e-6;

/// Rewrites raw features before scaling.
///
/// On transform the generator:
/// 1. drops `column_to_drop`
/// 2. maps the codes of `column_to_remap` through `value_map` (unmapped codes become null)
/// 3. clamps negative values of each Box-Cox column to 0, shifts by +1 and
///    applies the Box-Cox transform with the lambda learned at fit time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureGenerator {
    column_to_drop: String,
    column_to_remap: String,
    value_map: BTreeMap<i64, f64>,
    normal_distribution_columns: Vec<String>,
    lambdas: BTreeMap<String, f64>,
    is_fitted: bool,
}

impl FeatureGenerator {
    pub fn new(
        column_to_drop: impl Into<String>,
        column_to_remap: impl Into<String>,
        normal_distribution_columns: Vec<String>,
    ) -> Self {
        Self {
            column_to_drop: column_to_drop.into(),
            column_to_remap: column_to_remap.into(),
            value_map: BTreeMap::from([(2, 0.0), (1, 1.0)]),
            normal_distribution_columns,
            lambdas: BTreeMap::new(),
            is_fitted: false,
        }
    }

    pub fn from_schema(schema: &DatasetSchema) -> Self {
        Self::new(
            schema.column_to_drop.clone(),
            schema.column_to_remap.clone(),
            schema.normal_distribution_columns.clone(),
        )
        .with_value_map(schema.value_map.clone())
    }

    pub fn with_value_map(mut self, value_map: BTreeMap<i64, f64>) -> Self {
        self.value_map = value_map;
        self
    }

    /// Learn one Box-Cox lambda per normalized column
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let df = self.drop_and_remap(df)?;

        let mut lambdas = BTreeMap::new();
        for col_name in &self.normal_distribution_columns {
            let values: Vec<f64> = Self::column_f64(&df, col_name)?
                .into_iter()
                .flatten()
                .map(shift_positive)
                .collect();

            let lambda = match estimate_boxcox_lambda(&values) {
                Some(lambda) => lambda,
                None => {
                    warn!(column = %col_name, "Column is constant; Box-Cox lambda defaults to 1");
                    1.0
                }
            };
            debug!(column = %col_name, lambda, "Fitted Box-Cox lambda");
            lambdas.insert(col_name.clone(), lambda);
        }

        self.lambdas = lambdas;
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(AutoMlError::ModelNotFitted);
        }

        let mut result = self.drop_and_remap(df)?;
        for (col_name, &lambda) in &self.lambdas {
            let transformed: Float64Chunked = Self::column_f64(&result, col_name)?
                .into_iter()
                .map(|opt| opt.map(|v| boxcox(shift_positive(v), lambda)))
                .collect();
            result = result
                .with_column(transformed.with_name(col_name.as_str().into()).into_series())?
                .clone();
        }
        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fitted lambda of a normalized column
    pub fn lambda(&self, column: &str) -> Option<f64> {
        self.lambdas.get(column).copied()
    }

    pub fn column_to_drop(&self) -> &str {
        &self.column_to_drop
    }

    fn drop_and_remap(&self, df: &DataFrame) -> Result<DataFrame> {
        let df = cast_numeric_to_f64(df)?;
        let mut result = df
            .drop(&self.column_to_drop)
            .map_err(|_| AutoMlError::FeatureNotFound(self.column_to_drop.clone()))?;

        let remapped: Float64Chunked = Self::column_f64(&result, &self.column_to_remap)?
            .into_iter()
            .map(|opt| opt.and_then(|v| self.map_code(v)))
            .collect();
        result = result
            .with_column(
                remapped
                    .with_name(self.column_to_remap.as_str().into())
                    .into_series(),
            )?
            .clone();
        Ok(result)
    }

    fn map_code(&self, value: f64) -> Option<f64> {
        if value.fract() != 0.0 {
            return None;
        }
        self.value_map.get(&(value as i64)).copied()
    }

    fn column_f64(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
        let column = df
            .column(name)
            .map_err(|_| AutoMlError::FeatureNotFound(name.to_string()))?;
        Ok(column.as_materialized_series().f64()?.clone())
    }
}

fn shift_positive(x: f64) -> f64 {
    x.max(0.0) + 1.0
}

fn boxcox(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Profile log-likelihood of the Box-Cox transform at `lambda`
fn boxcox_log_likelihood(values: &[f64], log_sum: f64, lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| boxcox(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n;

    if variance <= 0.0 || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }
    (lambda - 1.0) * log_sum - n / 2.0 * variance.ln()
}

/// Maximum-likelihood lambda for strictly positive `values`.
///
/// A coarse grid locates the peak, then golden-section search refines it
/// within one grid step. `None` when the likelihood is nowhere finite, as for
/// constant or empty data.
pub(crate) fn estimate_boxcox_lambda(values: &[f64]) -> Option<f64> {
    if values.len() < 2 || values.iter().all(|&v| v == values[0]) {
        return None;
    }
    let log_sum: f64 = values.iter().map(|x| x.ln()).sum();
    let llf = |lambda: f64| boxcox_log_likelihood(values, log_sum, lambda);

    let steps = ((LAMBDA_MAX - LAMBDA_MIN) / LAMBDA_GRID_STEP).round() as usize;
    let mut best_lambda = None;
    let mut best_ll = f64::NEG_INFINITY;
    for i in 0..=steps {
        let lambda = LAMBDA_MIN + i as f64 * LAMBDA_GRID_STEP;
        let ll = llf(lambda);
        if ll > best_ll {
            best_ll = ll;
            best_lambda = Some(lambda);
        }
    }
    let center = best_lambda?;

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut lo = (center - LAMBDA_GRID_STEP).max(LAMBDA_MIN);
    let mut hi = (center + LAMBDA_GRID_STEP).min(LAMBDA_MAX);
    let mut c = hi - inv_phi * (hi - lo);
    let mut d = lo + inv_phi * (hi - lo);
    let (mut fc, mut fd) = (llf(c), llf(d));
    while hi - lo > GOLDEN_TOL {
        if fc > fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - inv_phi * (hi - lo);
            fc = llf(c);
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + inv_phi * (hi - lo);
            fd = llf(d);
        }
    }
    let refined = (lo + hi) / 2.0;

    if llf(refined) >= best_ll {
        Some(refined)
    } else {
        Some(center)
    }
}
