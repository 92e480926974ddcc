//! Credit card AutoML - command-line entry point

use clap::Parser;
use creditcard_automl::cli::{cmd_predict, cmd_run, cmd_search, cmd_validate, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creditcard_automl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run(&config)?,
        Commands::Search { data, target, models, base_accuracy, parallel } => {
            cmd_search(&data, &target, &models, base_accuracy, parallel)?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Validate { train, test, schema, output } => {
            cmd_validate(&train, &test, &schema, output.as_deref())?;
        }
    }

    Ok(())
}
