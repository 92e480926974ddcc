//! CSV loading and saving

use crate::error::{AutoMlError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Reads CSV files with a header row
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned to infer column types; `None` scans the whole file
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    pub fn load_csv<P: AsRef<Path>>(&self, path: P) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)
            .map_err(|e| AutoMlError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded CSV"
        );
        Ok(df)
    }
}

/// Writes DataFrames to disk
pub struct DataSaver;

impl DataSaver {
    /// Save as CSV with a header row, creating parent directories
    pub fn save_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.csv");

        let mut df = DataFrame::new(vec![
            Series::new("a".into(), &[1i64, 2, 3]).into(),
            Series::new("b".into(), &[0.5, 1.5, 2.5]).into(),
        ])
        .unwrap();
        DataSaver::save_csv(&mut df, &path).unwrap();

        let loaded = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(loaded.shape(), (3, 2));
        assert_eq!(loaded.column("a").unwrap().dtype(), &DataType::Int64);
        assert_eq!(loaded.column("b").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DataLoader::new().load_csv("/nonexistent/data.csv"),
            Err(AutoMlError::DataError(_))
        ));
    }
}
