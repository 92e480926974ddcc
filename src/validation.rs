//! Data validation: file presence, schema conformance and train/test drift

use crate::error::{AutoMlError, Result};
use crate::ingestion::DataIngestionArtifact;
use crate::schema::DatasetSchema;
use crate::utils::DataLoader;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Two-sample Kolmogorov-Smirnov test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Significance level
    alpha: f64,
}

impl KolmogorovSmirnovTest {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.001, 0.5),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Largest distance between the empirical CDFs of two samples
    pub fn statistic(reference: &[f64], current: &[f64]) -> f64 {
        let mut a = reference.to_vec();
        let mut b = current.to_vec();
        a.sort_by(f64::total_cmp);
        b.sort_by(f64::total_cmp);

        let (n1, n2) = (a.len() as f64, b.len() as f64);
        let (mut i, mut j) = (0, 0);
        let mut d: f64 = 0.0;
        while i < a.len() && j < b.len() {
            let x = a[i].min(b[j]);
            while i < a.len() && a[i] <= x {
                i += 1;
            }
            while j < b.len() && b[j] <= x {
                j += 1;
            }
            d = d.max((i as f64 / n1 - j as f64 / n2).abs());
        }
        d
    }

    /// Asymptotic p-value of statistic `d` for sample sizes `n1` and `n2`
    pub fn p_value(d: f64, n1: usize, n2: usize) -> f64 {
        let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
        let lambda = (en + 0.12 + 0.11 / en) * d;
        kolmogorov_survival(lambda)
    }

    /// Test one column; NaN values are ignored
    pub fn test(&self, column: &str, reference: &[f64], current: &[f64]) -> Result<ColumnDrift> {
        let reference: Vec<f64> = reference.iter().copied().filter(|v| !v.is_nan()).collect();
        let current: Vec<f64> = current.iter().copied().filter(|v| !v.is_nan()).collect();
        if reference.is_empty() || current.is_empty() {
            return Err(AutoMlError::ValidationError(format!(
                "column `{}` has no values to compare",
                column
            )));
        }

        let statistic = Self::statistic(&reference, &current);
        let p_value = Self::p_value(statistic, reference.len(), current.len());
        Ok(ColumnDrift {
            column: column.to_string(),
            statistic,
            p_value,
            drift_detected: p_value < self.alpha,
        })
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for j in 1..=100 {
        let term = (-2.0 * (j * j) as f64 * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Drift test outcome for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drift_detected: bool,
}

/// Per-column drift between the train and test split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub columns: Vec<ColumnDrift>,
    pub n_drifted: usize,
    pub share_drifted: f64,
    /// Set when `share_drifted` reaches the configured share
    pub dataset_drift: bool,
}

impl DriftReport {
    pub fn compute(
        reference: &DataFrame,
        current: &DataFrame,
        test: &KolmogorovSmirnovTest,
        drift_share: f64,
    ) -> Result<Self> {
        let mut columns = Vec::new();
        for col in reference.get_columns() {
            if !(col.dtype().is_integer() || col.dtype().is_float()) {
                continue;
            }
            let name = col.name().as_str();
            let Ok(other) = current.column(name) else {
                continue;
            };
            let a = numeric_values(col)?;
            let b = numeric_values(other)?;
            columns.push(test.test(name, &a, &b)?);
        }

        let n_drifted = columns.iter().filter(|c| c.drift_detected).count();
        let share_drifted = if columns.is_empty() {
            0.0
        } else {
            n_drifted as f64 / columns.len() as f64
        };

        Ok(Self {
            n_drifted,
            share_drifted,
            dataset_drift: !columns.is_empty() && share_drifted >= drift_share,
            columns,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn numeric_values(column: &Column) -> Result<Vec<f64>> {
    let casted = column.cast(&DataType::Float64)?;
    let values = casted.f64()?.into_iter().flatten().collect();
    Ok(values)
}

/// Check a frame against the schema: column count, names and types
pub fn validate_schema(df: &DataFrame, schema: &DatasetSchema) -> Result<()> {
    let mut problems = Vec::new();

    if df.width() != schema.columns.len() {
        problems.push(format!(
            "expected {} columns, found {}",
            schema.columns.len(),
            df.width()
        ));
    }
    for spec in &schema.columns {
        match df.column(&spec.name) {
            Ok(column) if !spec.dtype.matches(column.dtype()) => problems.push(format!(
                "column `{}` has type {}, expected {:?}",
                spec.name,
                column.dtype(),
                spec.dtype
            )),
            Ok(_) => {}
            Err(_) => problems.push(format!("column `{}` is missing", spec.name)),
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AutoMlError::ValidationError(problems.join("; ")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataValidationConfig {
    pub schema_file_path: PathBuf,
    /// KS significance level per column
    pub alpha: f64,
    /// Share of drifted columns that flags the dataset as drifted
    pub drift_share: f64,
    /// Fail the stage when dataset drift is detected
    pub fail_on_drift: bool,
}

impl Default for DataValidationConfig {
    fn default() -> Self {
        Self {
            schema_file_path: PathBuf::from("config/schema.yaml"),
            alpha: 0.05,
            drift_share: 0.5,
            fail_on_drift: false,
        }
    }
}

impl DataValidationConfig {
    pub fn new(schema_file_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_file_path: schema_file_path.into(),
            ..Default::default()
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_fail_on_drift(mut self, fail: bool) -> Self {
        self.fail_on_drift = fail;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    pub schema_file_path: PathBuf,
    pub report_file_path: PathBuf,
    pub is_validated: bool,
    pub drift_detected: bool,
    pub message: String,
}

pub struct DataValidation<'a> {
    config: DataValidationConfig,
    ingestion: &'a DataIngestionArtifact,
    output_dir: PathBuf,
}

impl<'a> DataValidation<'a> {
    pub fn new(
        config: DataValidationConfig,
        ingestion: &'a DataIngestionArtifact,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            ingestion,
            output_dir: output_dir.into(),
        }
    }

    pub fn run(&self) -> Result<DataValidationArtifact> {
        self.check_files_exist()?;

        let schema = DatasetSchema::from_path(&self.config.schema_file_path)?;
        let loader = DataLoader::new();
        let train_df = loader.load_csv(&self.ingestion.train_file_path)?;
        let test_df = loader.load_csv(&self.ingestion.test_file_path)?;

        info!("Verifying train and test data against the schema");
        validate_schema(&train_df, &schema)
            .map_err(|e| AutoMlError::ValidationError(format!("train data: {}", e)))?;
        validate_schema(&test_df, &schema)
            .map_err(|e| AutoMlError::ValidationError(format!("test data: {}", e)))?;

        let ks = KolmogorovSmirnovTest::new(self.config.alpha);
        let report = DriftReport::compute(&train_df, &test_df, &ks, self.config.drift_share)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let report_file_path = self.output_dir.join("drift_report.json");
        report.save(&report_file_path)?;

        if report.dataset_drift {
            warn!(
                drifted = report.n_drifted,
                share = report.share_drifted,
                "Data drift detected between train and test data"
            );
            if self.config.fail_on_drift {
                return Err(AutoMlError::ValidationError(format!(
                    "{} of {} columns drifted",
                    report.n_drifted,
                    report.columns.len()
                )));
            }
        }
        info!(
            drifted = report.n_drifted,
            columns = report.columns.len(),
            report = %report_file_path.display(),
            "Data validation completed"
        );

        Ok(DataValidationArtifact {
            schema_file_path: self.config.schema_file_path.clone(),
            report_file_path,
            is_validated: true,
            drift_detected: report.dataset_drift,
            message: "Data validation performed successfully".to_string(),
        })
    }

    fn check_files_exist(&self) -> Result<()> {
        let train = &self.ingestion.train_file_path;
        let test = &self.ingestion.test_file_path;
        let available = train.is_file() && test.is_file();
        info!(available, "Checked train and test files");
        if !available {
            return Err(AutoMlError::ValidationError(format!(
                "training file {} or test file {} is not present",
                train.display(),
                test.display()
            )));
        }
        Ok(())
    }
}
