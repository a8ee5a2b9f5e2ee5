pub mod cases;
pub mod cli;
pub mod config;
pub mod experiment;
pub mod pipeline;
pub mod prompt_export; // Plain-text prompt files per variant
pub mod results;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, PromptsArgs, RunArgs};
use config::CredentialTable;
use experiment::ExperimentError;
use prompt_export::ExportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Experiment(#[from] ExperimentError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Failed to write summary: {0}")]
    Summary(#[from] serde_json::Error),
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Execute a parsed command line. The run summary goes to stdout as JSON.
pub fn run(cli: Cli) -> Result<(), AppError> {
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Run(args) => run_command(&args),
        Commands::Prompts(args) => prompts_command(&args),
    }
}

fn run_command(args: &RunArgs) -> Result<(), AppError> {
    let config = args.to_config()?;
    let credentials = CredentialTable::from_env();
    tracing::debug!(configured_keys = credentials.len(), "Credentials loaded");
    let base_url = config::resolve_base_url(args.base_url.as_deref());

    let summary = experiment::run_experiment(&config, &credentials, &base_url)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn prompts_command(args: &PromptsArgs) -> Result<(), AppError> {
    let cases = cases::load_cases(
        &args.source.path,
        &args.source.sheet,
        cases::LabRequirement::Optional,
    )
    .map_err(ExportError::from)?;

    let summary = prompt_export::export_prompts(&cases, args.persona, &args.output_dir)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
