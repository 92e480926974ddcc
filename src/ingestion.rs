//! Data ingestion: copy the raw dataset and split it into train and test files

use crate::error::{AutoMlError, Result};
use crate::utils::{DataLoader, DataSaver};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the raw data comes from and how it is split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataIngestionConfig {
    /// Directory holding the raw dataset
    pub source_dir: PathBuf,
    /// File name of the dataset inside `source_dir`
    pub file_name: String,
    /// Column to stratify on; the last column when unset
    pub target_column: Option<String>,
    pub test_ratio: f64,
    pub random_state: u64,
}

impl Default for DataIngestionConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data"),
            file_name: "UCI_Credit_Card.csv".to_string(),
            target_column: None,
            test_ratio: 0.2,
            random_state: 42,
        }
    }
}

impl DataIngestionConfig {
    pub fn new(source_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn with_target_column(mut self, target: impl Into<String>) -> Self {
        self.target_column = Some(target.into());
        self
    }

    pub fn with_test_ratio(mut self, ratio: f64) -> Self {
        self.test_ratio = ratio;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}

/// Files produced by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub raw_file_path: PathBuf,
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

pub struct DataIngestion {
    config: DataIngestionConfig,
    /// Stage output directory
    output_dir: PathBuf,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
        }
    }

    pub fn run(&self) -> Result<DataIngestionArtifact> {
        let raw_file_path = self.copy_raw_data()?;
        self.split_train_test(&raw_file_path)
    }

    /// Copy the dataset into `<output_dir>/raw/`, replacing earlier copies
    fn copy_raw_data(&self) -> Result<PathBuf> {
        let source = self.config.source_dir.join(&self.config.file_name);
        if !source.is_file() {
            return Err(AutoMlError::DataError(format!(
                "dataset {} does not exist",
                source.display()
            )));
        }

        let raw_dir = self.output_dir.join("raw");
        if raw_dir.exists() {
            std::fs::remove_dir_all(&raw_dir)?;
        }
        std::fs::create_dir_all(&raw_dir)?;

        let destination = raw_dir.join(&self.config.file_name);
        std::fs::copy(&source, &destination)?;
        info!(source = %source.display(), destination = %destination.display(), "Copied raw dataset");
        Ok(destination)
    }

    fn split_train_test(&self, raw_file_path: &Path) -> Result<DataIngestionArtifact> {
        let df = DataLoader::new().load_csv(raw_file_path)?;

        let target = match &self.config.target_column {
            Some(target) => target.clone(),
            None => df
                .get_column_names()
                .last()
                .map(|name| name.to_string())
                .ok_or_else(|| AutoMlError::DataError("dataset has no columns".to_string()))?,
        };
        info!(target = %target, rows = df.height(), "Splitting data into train and test");

        let labels = class_labels(&df, &target)?;
        let (train_idx, test_idx) =
            stratified_split(&labels, self.config.test_ratio, self.config.random_state)?;

        let mut train_df = take_rows(&df, &train_idx)?;
        let mut test_df = take_rows(&df, &test_idx)?;

        let ingested_dir = self.output_dir.join("ingested");
        let train_file_path = ingested_dir.join("train").join(&self.config.file_name);
        let test_file_path = ingested_dir.join("test").join(&self.config.file_name);
        DataSaver::save_csv(&mut train_df, &train_file_path)?;
        DataSaver::save_csv(&mut test_df, &test_file_path)?;

        info!(
            train_rows = train_df.height(),
            test_rows = test_df.height(),
            train_file = %train_file_path.display(),
            test_file = %test_file_path.display(),
            "Data ingestion completed"
        );

        Ok(DataIngestionArtifact {
            raw_file_path: raw_file_path.to_path_buf(),
            train_file_path,
            test_file_path,
            train_rows: train_df.height(),
            test_rows: test_df.height(),
        })
    }
}

/// String form of every target value; nulls form their own class
fn class_labels(df: &DataFrame, target: &str) -> Result<Vec<String>> {
    let column = df
        .column(target)
        .map_err(|_| AutoMlError::FeatureNotFound(target.to_string()))?;
    let as_str = column.cast(&DataType::String)?;
    let labels = as_str
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or("null").to_string())
        .collect();
    Ok(labels)
}

fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::new("idx".into(), &idx);
    Ok(df.take(&idx)?)
}

/// Split row indices so every class keeps its proportion in both parts.
///
/// Each class contributes `round(count * test_ratio)` shuffled rows to the
/// test part. Both returned index lists are sorted.
pub fn stratified_split(
    labels: &[String],
    test_ratio: f64,
    random_state: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(AutoMlError::ConfigError(format!(
            "test_ratio must lie in (0, 1), got {}",
            test_ratio
        )));
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for (_, mut indices) in by_class {
        indices.shuffle(&mut rng);
        let n_test = (indices.len() as f64 * test_ratio).round() as usize;
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(AutoMlError::DataError(format!(
            "split of {} rows with test_ratio {} leaves an empty part",
            labels.len(),
            test_ratio
        )));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counts: &[(&str, usize)]) -> Vec<String> {
        counts
            .iter()
            .flat_map(|(label, n)| std::iter::repeat(label.to_string()).take(*n))
            .collect()
    }

    #[test]
    fn test_stratified_split_keeps_proportions() {
        let labels = labels(&[("0", 80), ("1", 20)]);
        let (train, test) = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        let test_pos = test.iter().filter(|&&i| labels[i] == "1").count();
        assert_eq!(test_pos, 4);
    }

    #[test]
    fn test_split_is_partition_and_deterministic() {
        let labels = labels(&[("a", 33), ("b", 17)]);
        let (train, test) = stratified_split(&labels, 0.3, 7).unwrap();
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());

        assert_eq!(stratified_split(&labels, 0.3, 7).unwrap(), (train, test));
    }

    #[test]
    fn test_invalid_ratio() {
        let labels = labels(&[("a", 10)]);
        assert!(stratified_split(&labels, 0.0, 1).is_err());
        assert!(stratified_split(&labels, 1.0, 1).is_err());
    }

    #[test]
    fn test_ingestion_writes_split_files() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let mut df = DataFrame::new(vec![
            Series::new("x".into(), (0..20).map(|i| i as f64).collect::<Vec<_>>()).into(),
            Series::new("y".into(), (0..20).map(|i| (i % 2) as i64).collect::<Vec<_>>()).into(),
        ])
        .unwrap();
        DataSaver::save_csv(&mut df, source.path().join("data.csv")).unwrap();

        let config = DataIngestionConfig::new(source.path(), "data.csv");
        let artifact = DataIngestion::new(config, output.path()).run().unwrap();

        assert!(artifact.raw_file_path.is_file());
        assert!(artifact.train_file_path.ends_with("ingested/train/data.csv"));
        assert!(artifact.test_file_path.ends_with("ingested/test/data.csv"));
        assert_eq!(artifact.train_rows, 16);
        assert_eq!(artifact.test_rows, 4);
    }

    #[test]
    fn test_missing_dataset() {
        let output = tempfile::tempdir().unwrap();
        let config = DataIngestionConfig::new("/nonexistent", "data.csv");
        assert!(DataIngestion::new(config, output.path()).run().is_err());
    }
}
