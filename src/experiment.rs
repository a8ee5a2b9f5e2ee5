//! Experiment runner: load cases, query the model for each one in order,
//! persist every validated result.
//!
//! A case is fully retrieved and written (JSON, then CSV row) before the
//! next one starts. The first terminal failure stops the run; rows already
//! appended stay on disk and the run is resumed with a start offset.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cases::{self, CaseError, CaseSet, LabRequirement};
use crate::config::{ConfigError, CredentialTable};
use crate::pipeline::llm::{
    profile_for, ChatClient, LlmError, ModelProfile, OpenAiClient, SamplingParams,
};
use crate::pipeline::{
    build_messages, build_prompt, PromptOptions, RetrievalError, RetryPolicy, StructuredRetriever,
};
use crate::results::{ResultError, ResultRecord, ResultStore, RunLayout};

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Case loading error: {0}")]
    Cases(#[from] CaseError),

    #[error("Result storage error: {0}")]
    Results(#[from] ResultError),

    #[error("{0}")]
    Retrieval(#[from] RetrievalError),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),
}

/// Settings for one experiment run (one model, one prompt variant, one repetition).
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 1-based repetition; selects the API credential and the `rep{n}` directory.
    pub repetition: u32,
    pub prompt_version: String,
    pub options: PromptOptions,
    /// Number of leading cases to skip.
    pub start: usize,
    pub cases_path: PathBuf,
    pub sheet: String,
    pub output_root: PathBuf,
    #[serde(skip)]
    pub policy: RetryPolicy,
}

impl ExperimentConfig {
    /// Sampling parameters the model accepts. Reasoning models get none.
    pub fn sampling_for(&self, profile: &ModelProfile) -> SamplingParams {
        if profile.accepts_sampling {
            SamplingParams {
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
            }
        } else {
            SamplingParams::default()
        }
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout::new(
            &self.output_root,
            &self.model,
            &self.prompt_version,
            &self.options,
            self.repetition,
        )
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub model: String,
    pub task: String,
    pub repetition: u32,
    pub processed: usize,
    /// Cases skipped by the start offset.
    pub skipped: usize,
    /// Rows dropped at load time.
    pub excluded: usize,
    pub total_tokens: u64,
    pub csv_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one run over an already-loaded case set.
pub struct ExperimentRunner<'a> {
    client: &'a dyn ChatClient,
    config: &'a ExperimentConfig,
}

impl<'a> ExperimentRunner<'a> {
    pub fn new(client: &'a dyn ChatClient, config: &'a ExperimentConfig) -> Self {
        Self { client, config }
    }

    pub fn run(&self, cases: &CaseSet) -> Result<RunSummary, ExperimentError> {
        let config = self.config;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let profile = profile_for(&config.model);
        let sampling = config.sampling_for(&profile);
        let mut store = ResultStore::open(config.layout())?;

        tracing::info!(
            run_id = %run_id,
            model = %config.model,
            family = profile.family,
            max_tokens = ?sampling.max_tokens,
            temperature = ?sampling.temperature,
            repetition = config.repetition,
            prompt_version = %config.prompt_version,
            persona = ?config.options.persona,
            with_thoughts = config.options.with_thoughts,
            with_lab_results = config.options.with_lab_results,
            start = config.start,
            max_attempts = config.policy.max_attempts(),
            task = %store.layout().task,
            "Starting experiment"
        );

        let pending = cases.resume_from(config.start);
        let skipped = cases.len() - pending.len();
        if pending.is_empty() {
            tracing::warn!(
                start = config.start,
                cases = cases.len(),
                "Start offset leaves no cases to process"
            );
        }

        let retriever =
            StructuredRetriever::new(self.client, &config.model, sampling, config.policy)
                .with_dump_dir(store.run_dir().to_path_buf());

        let mut processed = 0usize;
        let mut total_tokens = 0u64;

        for (index, case) in pending.iter().enumerate() {
            let _span = tracing::info_span!(
                "case",
                case = %case.id,
                index = config.start + index
            )
            .entered();

            let prompt = build_prompt(case, &config.options);
            let messages = build_messages(&prompt, &profile);

            let retrieval = match retriever.retrieve(&case.id, &messages) {
                Ok(retrieval) => retrieval,
                Err(e) => {
                    tracing::error!(
                        case = %case.id,
                        processed,
                        error = %e,
                        "Retrieval failed, halting run"
                    );
                    return Err(e.into());
                }
            };

            store.write_case_json(&case.id, &retrieval.document)?;
            store.append(&ResultRecord::from(&retrieval))?;

            processed += 1;
            total_tokens += retrieval.total_tokens;

            tracing::info!(
                case = %case.id,
                t1 = %retrieval.triple.top1,
                t2 = %retrieval.triple.top2,
                t3 = %retrieval.triple.top3,
                tokens = retrieval.total_tokens,
                attempts = retrieval.attempts,
                "Case complete"
            );
        }

        let summary = RunSummary {
            run_id,
            model: config.model.clone(),
            task: store.layout().task.clone(),
            repetition: config.repetition,
            processed,
            skipped,
            excluded: cases.excluded().len(),
            total_tokens,
            csv_path: store.csv_path().to_path_buf(),
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run_id = %run_id,
            processed = summary.processed,
            skipped = summary.skipped,
            excluded = summary.excluded,
            total_tokens = summary.total_tokens,
            "Experiment finished"
        );

        Ok(summary)
    }
}

/// Resolve the credential, load the cases, and run against the HTTP endpoint.
pub fn run_experiment(
    config: &ExperimentConfig,
    credentials: &CredentialTable,
    base_url: &str,
) -> Result<RunSummary, ExperimentError> {
    let api_key = credentials.key_for(config.repetition)?;
    let cases = cases::load_cases(
        &config.cases_path,
        &config.sheet,
        LabRequirement::from_flag(config.options.with_lab_results),
    )?;
    let client = OpenAiClient::with_default_timeout(base_url, api_key)?;

    ExperimentRunner::new(&client, config).run(&cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::collect_cases;
    use crate::pipeline::llm::mock::ScriptedChatClient;
    use crate::pipeline::llm::Role;
    use crate::pipeline::Persona;
    use std::path::Path;
    use std::time::Duration;

    const VALID: &str = r#"{"thoughts":"t","top1":"A","top2":"B","top3":"C"}"#;

    fn config(root: &Path, model: &str) -> ExperimentConfig {
        ExperimentConfig {
            model: model.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            repetition: 1,
            prompt_version: "v1.0".to_string(),
            options: PromptOptions {
                persona: Persona::Single,
                with_thoughts: true,
                with_lab_results: false,
            },
            start: 0,
            cases_path: root.join("cases.csv"),
            sheet: "Sheet1".to_string(),
            output_root: root.to_path_buf(),
            policy: RetryPolicy::new(3, Duration::ZERO).unwrap(),
        }
    }

    fn case_set(ids: &[&str]) -> CaseSet {
        let header = vec![Some("Case".to_string()), Some("SS".to_string())];
        let rows = std::iter::once(header).chain(
            ids.iter()
                .map(|id| vec![Some(id.to_string()), Some(format!("narrative {id}"))]),
        );
        collect_cases(rows, LabRequirement::Optional).unwrap()
    }

    fn csv_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn processes_every_case_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "gpt-4o");
        let client = ScriptedChatClient::always(VALID, 25);

        let summary = ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1", "2", "3"]))
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.total_tokens, 75);
        assert_eq!(summary.task, "ER_3DDX_v1.0_WithThoughts");
        assert_eq!(
            csv_lines(&summary.csv_path),
            vec![
                "Case,t1,t2,t3,Tokens",
                "1,A,B,C,25",
                "2,A,B,C,25",
                "3,A,B,C,25"
            ]
        );
        let json_path = summary.csv_path.parent().unwrap().join("2.json");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["top1"], "A");
        assert_eq!(json["thoughts"], "t");
    }

    #[test]
    fn start_offset_skips_leading_cases() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "gpt-4o");
        config.start = 2;
        let client = ScriptedChatClient::always(VALID, 10);

        let summary = ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1", "2", "3", "4"]))
            .unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed, 2);
        let lines = csv_lines(&summary.csv_path);
        assert_eq!(&lines[1..], &["3,A,B,C,10", "4,A,B,C,10"]);
        assert!(client.requests()[0].1[1].content.contains("narrative 3"));
    }

    #[test]
    fn offset_past_end_processes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "gpt-4o");
        config.start = 10;
        let client = ScriptedChatClient::always(VALID, 10);

        let summary = ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1", "2"]))
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(client.calls(), 0);
        assert!(!summary.csv_path.exists());
    }

    #[test]
    fn failed_case_halts_run_without_row() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "gpt-4o");
        // Case 1 succeeds, case 2 exhausts its three attempts.
        let client = ScriptedChatClient::new()
            .then_reply(VALID, 10)
            .then_reply("not json", 10);

        let err = ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1", "2", "3"]))
            .unwrap_err();

        match err {
            ExperimentError::Retrieval(e) => assert_eq!(e.case_id(), Some("2")),
            other => panic!("expected retrieval error, got {other:?}"),
        }
        assert_eq!(client.calls(), 4);

        let layout = config.layout();
        assert_eq!(csv_lines(&layout.csv_path), vec!["Case,t1,t2,t3,Tokens", "1,A,B,C,10"]);
        assert!(!layout.case_json_path("2").exists());
        assert!(layout.run_dir.join("last_exchange.txt").exists());
    }

    #[test]
    fn resumed_run_appends_to_existing_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "gpt-4o");
        let cases = case_set(&["1", "2"]);

        let first = ScriptedChatClient::new()
            .then_reply(VALID, 10)
            .then_fail(LlmError::Connection("http://localhost".into()));
        assert!(ExperimentRunner::new(&first, &config).run(&cases).is_err());

        config.start = 1;
        let second = ScriptedChatClient::always(VALID, 10);
        let summary = ExperimentRunner::new(&second, &config).run(&cases).unwrap();

        assert_eq!(
            csv_lines(&summary.csv_path),
            vec!["Case,t1,t2,t3,Tokens", "1,A,B,C,10", "2,A,B,C,10"]
        );
    }

    #[test]
    fn reasoning_model_gets_single_user_message_and_no_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "o1-preview");
        let client = ScriptedChatClient::always(VALID, 10);

        let summary = ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1"]))
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].1.len(), 1);
        assert_eq!(requests[0].1[0].role, Role::User);
        assert_eq!(requests[0].2, SamplingParams::default());
        assert!(summary
            .csv_path
            .starts_with(dir.path().join("result_o1_preview")));
    }

    #[test]
    fn chat_model_gets_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "chatgpt-4o-latest");
        let client = ScriptedChatClient::always(VALID, 10);

        ExperimentRunner::new(&client, &config)
            .run(&case_set(&["1"]))
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].1[0].role, Role::System);
        assert_eq!(
            requests[0].2,
            SamplingParams {
                max_tokens: Some(1000),
                temperature: Some(0.7),
            }
        );
    }

    #[test]
    fn excluded_rows_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "gpt-4o");
        let rows = vec![
            vec![Some("Case".to_string()), Some("SS".to_string())],
            vec![Some("1".to_string()), Some("n".to_string())],
            vec![Some("2".to_string()), None],
        ];
        let cases = collect_cases(rows, LabRequirement::Optional).unwrap();
        let client = ScriptedChatClient::always(VALID, 10);

        let summary = ExperimentRunner::new(&client, &config).run(&cases).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.excluded, 1);
    }

    #[test]
    fn missing_credential_fails_before_loading_cases() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "gpt-4o");

        let err =
            run_experiment(&config, &CredentialTable::new(), "http://localhost:1").unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::Config(ConfigError::MissingCredential { repetition: 1 })
        ));
    }

    #[test]
    fn run_experiment_end_to_end_over_http() {
        use httpmock::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cases.csv"),
            "Case,SS,LR\n1,Chest pain,Troponin high\n2,Headache,\n",
        )
        .unwrap();
        let config = config(dir.path(), "gpt-4o");

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer key-one");
            then.status(200).json_body(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": VALID}}],
                "usage": {"total_tokens": 42}
            }));
        });

        let credentials = CredentialTable::new().with_key(1, "key-one");
        let summary = run_experiment(&config, &credentials, &server.base_url()).unwrap();

        mock.assert_calls(2);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.total_tokens, 84);
    }
}
