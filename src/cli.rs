use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config;
use crate::experiment::{ExperimentConfig, ExperimentError};
use crate::pipeline::retriever::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::pipeline::{Persona, PromptOptions, RetryPolicy};

#[derive(Parser, Debug)]
#[command(name = "ddx-harness", version)]
#[command(about = "Differential-diagnosis benchmark runner for chat-completion models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query the model for every case and append results to the run CSV
    Run(RunArgs),
    /// Write the plain-text prompts for every case and variant
    Prompts(PromptsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CaseSource {
    /// Case table (xlsx/xls/xlsb/ods workbook or CSV)
    #[arg(long = "cases", default_value = config::DEFAULT_CASES_PATH)]
    pub path: PathBuf,

    /// Worksheet name (ignored for CSV)
    #[arg(long, default_value = config::DEFAULT_SHEET)]
    pub sheet: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Model name sent to the endpoint
    #[arg(long, default_value = "chatgpt-4o-latest")]
    pub model: String,

    /// Maximum tokens per completion (ignored for reasoning models)
    #[arg(long, default_value_t = 1000)]
    pub max_tokens: u32,

    /// Sampling temperature (ignored for reasoning models)
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Repetition number; selects API_KEY_<n>
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=5))]
    pub rep: u32,

    /// Prompt version label used in the task name
    #[arg(long, default_value = "v1.0")]
    pub prompt_version: String,

    /// Ask the model for its reasoning alongside the diagnoses
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub with_thoughts: bool,

    /// Include lab results; cases without them are excluded
    #[arg(long = "with-lr", default_value_t = false, action = ArgAction::Set)]
    pub with_lab_results: bool,

    /// Number of leading cases to skip (resume after interruption)
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Single physician or a three-physician panel
    #[arg(long, value_enum, default_value_t = Persona::Single)]
    pub persona: Persona,

    /// Attempts per case before the run halts
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Pause between attempts, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,

    #[command(flatten)]
    pub source: CaseSource,

    /// Directory that receives result_* folders
    #[arg(long, default_value = ".")]
    pub output_root: PathBuf,

    /// Chat-completion base URL
    #[arg(long, env = config::BASE_URL_ENV)]
    pub base_url: Option<String>,
}

impl RunArgs {
    pub fn to_config(&self) -> Result<ExperimentConfig, ExperimentError> {
        let policy = RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )?;

        Ok(ExperimentConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            repetition: self.rep,
            prompt_version: self.prompt_version.clone(),
            options: PromptOptions {
                persona: self.persona,
                with_thoughts: self.with_thoughts,
                with_lab_results: self.with_lab_results,
            },
            start: self.start,
            cases_path: self.source.path.clone(),
            sheet: self.source.sheet.clone(),
            output_root: self.output_root.clone(),
            policy,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct PromptsArgs {
    #[command(flatten)]
    pub source: CaseSource,

    /// Output directory
    #[arg(long, default_value = config::DEFAULT_PROMPT_EXPORT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Persona::Single)]
    pub persona: Persona,
}
