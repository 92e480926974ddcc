//! Data preprocessing
//!
//! - [`FeatureGenerator`]: drop the identifier column, remap categorical codes
//!   and Box-Cox normalize skewed columns
//! - [`StandardScaler`]: z-score scaling
//! - [`PreprocessingPipeline`]: both steps chained, producing an `Array2<f64>`

mod feature_generator;
mod pipeline;
mod scaler;

pub use feature_generator::FeatureGenerator;
pub use pipeline::PreprocessingPipeline;
pub use scaler::{ScalerParams, StandardScaler};

use crate::error::{AutoMlError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Cast every integer and `Float32` column to `Float64`
pub fn cast_numeric_to_f64(df: &DataFrame) -> Result<DataFrame> {
    let mut result = df.clone();
    for col in df.get_columns() {
        if col.dtype().is_integer() || matches!(col.dtype(), DataType::Float32) {
            let casted = col.cast(&DataType::Float64)?;
            result = result.with_column(casted)?.clone();
        }
    }
    Ok(result)
}

/// Extract named columns into a row-major matrix.
///
/// Fails on nulls, which mark values the preprocessing could not map.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| column_values(df, col_name))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

/// Extract one column as a label vector
pub fn column_to_array1(df: &DataFrame, col_name: &str) -> Result<Array1<f64>> {
    Ok(Array1::from(column_values(df, col_name)?))
}

fn column_values(df: &DataFrame, col_name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(col_name)
        .map_err(|_| AutoMlError::FeatureNotFound(col_name.to_string()))?;
    let casted = column.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                AutoMlError::PreprocessingError(format!("column `{}` contains missing values", col_name))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(values)
}
