use std::collections::BTreeMap;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "ddx-harness";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chat-completion endpoint used when neither `--base-url` nor the env var is set.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Env var overriding the chat-completion endpoint.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Credentials are read from `API_KEY_1` .. `API_KEY_{REPETITION_SLOTS}`.
pub const API_KEY_ENV_PREFIX: &str = "API_KEY_";

/// Number of repetitions that carry their own API credential.
pub const REPETITION_SLOTS: u32 = 5;

/// Default case workbook and sheet.
pub const DEFAULT_CASES_PATH: &str = "./30_cases_v0.3.xlsx";
pub const DEFAULT_SHEET: &str = "o1 preview";

/// Default output directory for `prompts`.
pub const DEFAULT_PROMPT_EXPORT_DIR: &str = "./generated_prompts_text";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "warn,ddx_harness=info"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Repetition {0} is out of range (expected 1..=5)")]
    RepetitionOutOfRange(u32),

    #[error("No API key configured for repetition {repetition} (set API_KEY_{repetition})")]
    MissingCredential { repetition: u32 },
}

/// API credential per repetition number.
///
/// Each repetition of an experiment runs under its own key so that usage can be
/// attributed per repetition. The table is built once at startup and passed
/// into the run.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    keys: BTreeMap<u32, String>,
}

impl CredentialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the key for a repetition. Blank keys are ignored.
    pub fn with_key(mut self, repetition: u32, key: &str) -> Self {
        let key = key.trim();
        if !key.is_empty() {
            self.keys.insert(repetition, key.to_string());
        }
        self
    }

    /// Build the table from a variable lookup (`API_KEY_1` .. `API_KEY_5`).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        (1..=REPETITION_SLOTS).fold(Self::new(), |table, rep| {
            match lookup(&format!("{API_KEY_ENV_PREFIX}{rep}")) {
                Some(key) => table.with_key(rep, &key),
                None => table,
            }
        })
    }

    /// Build the table from the process environment.
    ///
    /// Callers load `.env` (dotenvy) before this.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Key for a repetition.
    pub fn key_for(&self, repetition: u32) -> Result<&str, ConfigError> {
        if repetition == 0 || repetition > REPETITION_SLOTS {
            return Err(ConfigError::RepetitionOutOfRange(repetition));
        }
        self.keys
            .get(&repetition)
            .map(String::as_str)
            .ok_or(ConfigError::MissingCredential { repetition })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolve the endpoint: explicit value, then default.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}
