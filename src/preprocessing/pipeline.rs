//! Preprocessing pipeline: feature generation followed by standard scaling

use super::{columns_to_array2, FeatureGenerator, StandardScaler};
use crate::error::{AutoMlError, Result};
use crate::schema::DatasetSchema;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Fitted preprocessing applied identically to training data and to new data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingPipeline {
    input_columns: Vec<String>,
    generator: FeatureGenerator,
    scaler: StandardScaler,
    output_columns: Vec<String>,
    is_fitted: bool,
}

impl PreprocessingPipeline {
    pub fn new(input_columns: Vec<String>, generator: FeatureGenerator) -> Self {
        Self {
            input_columns,
            generator,
            scaler: StandardScaler::new(),
            output_columns: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn from_schema(schema: &DatasetSchema) -> Self {
        Self::new(schema.input_columns(), FeatureGenerator::from_schema(schema))
    }

    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let start = Instant::now();
        let selected = self.select_inputs(df)?;

        let generated = self.generator.fit_transform(&selected)?;
        let output_columns: Vec<String> = generated
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let column_refs: Vec<&str> = output_columns.iter().map(String::as_str).collect();
        self.scaler.fit(&generated, &column_refs)?;

        self.output_columns = output_columns;
        self.is_fitted = true;
        info!(
            rows = df.height(),
            features = self.output_columns.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Preprocessing fitted"
        );
        Ok(self)
    }

    /// Apply the fitted steps and return a row-major feature matrix
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(AutoMlError::ModelNotFitted);
        }
        let selected = self.select_inputs(df)?;
        let generated = self.generator.transform(&selected)?;
        let scaled = self.scaler.transform(&generated)?;
        columns_to_array2(&scaled, &self.output_columns)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fit(df)?;
        self.transform(df)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Column names of the produced matrix, in order
    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    pub fn generator(&self) -> &FeatureGenerator {
        &self.generator
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let pipeline: Self = serde_json::from_str(&json)?;
        Ok(pipeline)
    }

    fn select_inputs(&self, df: &DataFrame) -> Result<DataFrame> {
        if let Some(missing) = self.input_columns.iter().find(|c| df.column(c).is_err()) {
            return Err(AutoMlError::FeatureNotFound(missing.clone()));
        }
        Ok(df.select(self.input_columns.iter().map(String::as_str))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("ID".into(), &[1i64, 2, 3, 4, 5, 6]).into(),
            Series::new("LIMIT_BAL".into(), &[20000.0, 120000.0, 90000.0, 50000.0, 50000.0, 500000.0]).into(),
            Series::new("SEX".into(), &[2i64, 2, 2, 1, 1, 1]).into(),
            Series::new("AGE".into(), &[24i64, 26, 34, 37, 57, 29]).into(),
            Series::new("default".into(), &[1i64, 1, 0, 0, 0, 0]).into(),
        ])
        .unwrap()
    }

    fn pipeline() -> PreprocessingPipeline {
        let generator = FeatureGenerator::new("ID", "SEX", vec!["LIMIT_BAL".to_string()]);
        PreprocessingPipeline::new(
            vec!["ID".into(), "LIMIT_BAL".into(), "SEX".into(), "AGE".into()],
            generator,
        )
    }

    #[test]
    fn test_fit_transform_shape_and_scale() {
        let mut pipeline = pipeline();
        let x = pipeline.fit_transform(&frame()).unwrap();

        assert_eq!(x.dim(), (6, 3));
        assert_eq!(pipeline.output_columns(), &["LIMIT_BAL", "SEX", "AGE"]);
        for col in x.columns() {
            assert!(col.mean().unwrap().abs() < 1e-9);
        }
    }

    #[test]
    fn test_target_column_is_ignored() {
        let mut pipeline = pipeline();
        let x = pipeline.fit_transform(&frame()).unwrap();
        let without_target = frame().drop("default").unwrap();
        assert_eq!(pipeline.transform(&without_target).unwrap(), x);
    }

    #[test]
    fn test_missing_input_column() {
        let mut pipeline = pipeline();
        pipeline.fit(&frame()).unwrap();
        let df = frame().drop("AGE").unwrap();
        assert!(matches!(
            pipeline.transform(&df),
            Err(AutoMlError::FeatureNotFound(ref c)) if c == "AGE"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let mut pipeline = pipeline();
        let x = pipeline.fit_transform(&frame()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessing.json");
        pipeline.save(&path).unwrap();
        let restored = PreprocessingPipeline::load(&path).unwrap();

        let y = restored.transform(&frame()).unwrap();
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
