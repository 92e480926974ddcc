//! Data transformation: fit preprocessing on the train split and apply it to both splits

use crate::error::{AutoMlError, Result};
use crate::ingestion::DataIngestionArtifact;
use crate::preprocessing::{column_to_array1, columns_to_array2, PreprocessingPipeline};
use crate::schema::DatasetSchema;
use crate::utils::{DataLoader, DataSaver};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Files produced by the transformation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub preprocessing_file_path: PathBuf,
    /// Label column of the transformed files
    pub target_column: String,
}

pub struct DataTransformation<'a> {
    schema: &'a DatasetSchema,
    ingestion: &'a DataIngestionArtifact,
    output_dir: PathBuf,
}

impl<'a> DataTransformation<'a> {
    pub fn new(
        schema: &'a DatasetSchema,
        ingestion: &'a DataIngestionArtifact,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            schema,
            ingestion,
            output_dir: output_dir.into(),
        }
    }

    pub fn run(&self) -> Result<DataTransformationArtifact> {
        let loader = DataLoader::new();
        let train_df = loader.load_csv(&self.ingestion.train_file_path)?;
        let test_df = loader.load_csv(&self.ingestion.test_file_path)?;
        let target = &self.schema.target_column;

        info!(
            drop = %self.schema.column_to_drop,
            remap = %self.schema.column_to_remap,
            boxcox = ?self.schema.normal_distribution_columns,
            "Fitting preprocessing on training data"
        );
        let mut preprocessing = PreprocessingPipeline::from_schema(self.schema);
        let x_train = preprocessing.fit_transform(&train_df)?;
        let x_test = preprocessing.transform(&test_df)?;
        let y_train = column_to_array1(&train_df, target)?;
        let y_test = column_to_array1(&test_df, target)?;

        let file_name = |path: &Path| -> Result<String> {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| AutoMlError::DataError(format!("{} has no file name", path.display())))
        };
        let transformed_train_file_path = self
            .output_dir
            .join("train")
            .join(file_name(&self.ingestion.train_file_path)?);
        let transformed_test_file_path = self
            .output_dir
            .join("test")
            .join(file_name(&self.ingestion.test_file_path)?);

        let columns = preprocessing.output_columns();
        let mut train_out = to_dataframe(&x_train, columns, &y_train, target)?;
        let mut test_out = to_dataframe(&x_test, columns, &y_test, target)?;
        DataSaver::save_csv(&mut train_out, &transformed_train_file_path)?;
        DataSaver::save_csv(&mut test_out, &transformed_test_file_path)?;

        let preprocessing_file_path = self.output_dir.join("preprocessing.json");
        preprocessing.save(&preprocessing_file_path)?;

        info!(
            features = columns.len(),
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            "Data transformation completed"
        );

        Ok(DataTransformationArtifact {
            transformed_train_file_path,
            transformed_test_file_path,
            preprocessing_file_path,
            target_column: target.clone(),
        })
    }
}

/// Frame of feature columns followed by the label column
pub fn to_dataframe(
    x: &Array2<f64>,
    columns: &[String],
    y: &Array1<f64>,
    target: &str,
) -> Result<DataFrame> {
    if x.ncols() != columns.len() || x.nrows() != y.len() {
        return Err(AutoMlError::ShapeError {
            expected: format!("{} rows x {} columns", y.len(), columns.len()),
            actual: format!("{} rows x {} columns", x.nrows(), x.ncols()),
        });
    }

    let mut series: Vec<Column> = columns
        .iter()
        .zip(x.columns())
        .map(|(name, values)| Series::new(name.as_str().into(), values.to_vec()).into())
        .collect();
    series.push(Series::new(target.into(), y.to_vec()).into());
    Ok(DataFrame::new(series)?)
}

/// Load a transformed file back into features and labels
pub fn load_transformed<P: AsRef<Path>>(path: P, target: &str) -> Result<(Array2<f64>, Array1<f64>)> {
    let df = DataLoader::new().load_csv(path)?;
    let features: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != target)
        .collect();
    if features.len() == df.width() {
        return Err(AutoMlError::FeatureNotFound(target.to_string()));
    }
    let x = columns_to_array2(&df, &features)?;
    let y = column_to_array1(&df, target)?;
    Ok((x, y))
}
