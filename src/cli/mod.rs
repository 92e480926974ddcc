//! Command-line interface for the training pipeline, model search,
//! prediction and data validation.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::export::CreditCardEstimator;
use crate::factory::ModelFactory;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::schema::DatasetSchema;
use crate::transformation::load_transformed;
use crate::utils::{DataLoader, DataSaver};
use crate::validation::{validate_schema, DriftReport, KolmogorovSmirnovTest};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "creditcard-automl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Credit card default prediction: config-driven model search and training pipeline")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: ingestion, validation, transformation, training, packaging
    Run {
        /// Pipeline configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Search the configured candidates on an already transformed CSV
    Search {
        /// Transformed data file (features plus target column)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Model search configuration (YAML)
        #[arg(short, long)]
        models: PathBuf,

        /// Score a model must exceed to be selected
        #[arg(long, default_value = "0.6")]
        base_accuracy: f64,

        /// Search candidates concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Predict with a packaged model bundle
    Predict {
        /// Model bundle (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Raw input data (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV with a `prediction` column
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check train and test files against a schema and report drift
    Validate {
        #[arg(long)]
        train: PathBuf,

        #[arg(long)]
        test: PathBuf,

        /// Dataset schema (YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Where to write the drift report (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config_path: &Path) -> anyhow::Result<()> {
    section("Pipeline");

    let config = PipelineConfig::from_path(config_path)?;
    kv("Artifacts", &config.artifact_dir.display().to_string());
    kv("Dataset", &config.ingestion.source_dir.join(&config.ingestion.file_name).display().to_string());

    step_run("Running");
    let start = Instant::now();
    let artifact = Pipeline::new(config).run()?;
    step_done(&format!("{:.2?}", start.elapsed()));

    let metrics = &artifact.trainer.metrics;
    println!();
    kv("Model", &format!("{} ({})", metrics.model_name, artifact.trainer.serial_id));
    kv("Train accuracy", &format!("{:.4}", metrics.train_accuracy));
    kv("Test accuracy", &format!("{:.4}", metrics.test_accuracy));
    kv("Model accuracy", &format!("{:.4}", metrics.model_accuracy));
    kv("F1", &format!("{:.4}", metrics.f1));
    kv("Bundle", &artifact.packaged_model_path.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_search(
    data_path: &Path,
    target: &str,
    models_path: &Path,
    base_accuracy: f64,
    parallel: bool,
) -> anyhow::Result<()> {
    section("Model search");

    step_run("Loading data");
    let (x, y) = load_transformed(data_path, target)?;
    step_done(&format!("{} rows × {} features", x.nrows(), x.ncols()));

    let factory = ModelFactory::from_path(models_path)?;
    let candidates = factory.initialized_candidates()?;

    step_run(&format!("Searching {} candidates", candidates.len()));
    let start = Instant::now();
    let results = if parallel {
        factory.search_all_parallel(&candidates, &x, &y)?
    } else {
        factory.search_all(&candidates, &x, &y)?
    };
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    println!("  {:<12} {:<40} {:>8}", muted("Serial"), muted("Model"), muted("Score"));
    println!("  {}", dim(&"─".repeat(62)));
    for result in &results {
        println!(
            "  {:<12} {:<40} {:>8.4}",
            result.serial_id, result.model_name, result.best_score
        );
    }
    println!("  {}", dim(&"─".repeat(62)));

    match crate::factory::select_best(results, base_accuracy) {
        Ok(selected) => {
            println!();
            println!(
                "  {} {} {}",
                ok("best"),
                selected.result.model_name.white().bold(),
                muted(&crate::training::format_params(&selected.result.best_params)),
            );
        }
        Err(e) => {
            println!();
            println!("  {}", e.to_string().yellow());
        }
    }
    println!();
    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let estimator = CreditCardEstimator::load(model_path)?;
    step_done(&estimator.to_string());

    step_run("Loading data");
    let mut df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let predictions = estimator.predict(&df)?;
    let positives = predictions.iter().filter(|&&p| p == 1.0).count();
    step_done(&format!("{} of {} predicted to default", positives, predictions.len()));

    if let Some(output) = output {
        step_run(&format!("Saving → {}", output.display()));
        df.with_column(Series::new("prediction".into(), predictions.to_vec()))?;
        DataSaver::save_csv(&mut df, output)?;
        step_done("");
    }
    println!();
    Ok(())
}

pub fn cmd_validate(
    train_path: &Path,
    test_path: &Path,
    schema_path: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Validate");

    let schema = DatasetSchema::from_path(schema_path)?;
    let loader = DataLoader::new();
    let train_df = loader.load_csv(train_path)?;
    let test_df = loader.load_csv(test_path)?;

    for (label, df) in [("train", &train_df), ("test", &test_df)] {
        match validate_schema(df, &schema) {
            Ok(()) => println!("  {} {} matches the schema", ok("✓"), label),
            Err(e) => println!("  {} {}: {}", "✗".red(), label, e),
        }
    }

    let report = DriftReport::compute(&train_df, &test_df, &KolmogorovSmirnovTest::default(), 0.5)?;
    println!();
    println!("  {:<28} {:>10} {:>10}", muted("Column"), muted("KS"), muted("p-value"));
    println!("  {}", dim(&"─".repeat(50)));
    for col in &report.columns {
        let line = format!("  {:<28} {:>10.4} {:>10.4}", col.column, col.statistic, col.p_value);
        if col.drift_detected {
            println!("{}", line.yellow());
        } else {
            println!("{}", line);
        }
    }
    println!("  {}", dim(&"─".repeat(50)));
    kv("Drifted columns", &format!("{} of {}", report.n_drifted, report.columns.len()));
    kv("Dataset drift", &report.dataset_drift.to_string());

    if let Some(output) = output {
        report.save(output)?;
        kv("Report", &output.display().to_string());
    }
    println!();
    Ok(())
}
