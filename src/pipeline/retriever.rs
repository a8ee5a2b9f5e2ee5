//! Structured-response retriever: bounded retry around an unreliable
//! chat-completion call that must return the DDX JSON object.
//!
//! Only malformed output is retried here. Transport and API errors reach this
//! loop after the client's own transient resends and end the case
//! immediately. There is no backoff: the delay between attempts is fixed.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use super::diagnostic;
use super::llm::{ChatClient, ChatMessage, LlmError, SamplingParams};
use super::parser::{parse_diagnosis_response, DiagnosisTriple, ParseError, ParsedResponse};

/// Attempts per case unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Pause between attempts unless configured otherwise.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Attempt limit must be at least 1")]
    InvalidAttemptLimit,

    #[error("Prompt for case {case_id} is empty")]
    EmptyPrompt { case_id: String },

    #[error("Failed to get a valid response for case {case_id} after {attempts} attempts: {last_error}")]
    Exhausted {
        case_id: String,
        attempts: u32,
        last_error: ParseError,
    },

    #[error("LLM call for case {case_id} failed on attempt {attempt}: {source}")]
    Llm {
        case_id: String,
        attempt: u32,
        #[source]
        source: LlmError,
    },
}

impl RetrievalError {
    /// Case the failure belongs to, when there is one.
    pub fn case_id(&self) -> Option<&str> {
        match self {
            Self::InvalidAttemptLimit => None,
            Self::EmptyPrompt { case_id }
            | Self::Exhausted { case_id, .. }
            | Self::Llm { case_id, .. } => Some(case_id.as_str()),
        }
    }
}

/// Attempt limit and fixed inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, RetrievalError> {
        if max_attempts == 0 {
            return Err(RetrievalError::InvalidAttemptLimit);
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Reply parsed and carries all required keys.
    Success(ParsedResponse),
    /// Reply was malformed; another attempt may succeed.
    RetriableFailure(ParseError),
    /// The call itself failed; retrying will not help.
    TerminalFailure(LlmError),
}

/// One attempt's outcome plus the tokens it cost.
#[derive(Debug)]
pub struct Attempt {
    pub outcome: AttemptOutcome,
    pub tokens: u64,
}

/// A validated result for one case.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub case_id: String,
    pub triple: DiagnosisTriple,
    /// Full reply object, key order preserved.
    pub document: Map<String, Value>,
    /// Tokens billed across every attempt made for the case.
    pub total_tokens: u64,
    /// 1-based attempt that succeeded.
    pub attempts: u32,
}

/// Calls the model until it returns a valid DDX object or attempts run out.
pub struct StructuredRetriever<'a> {
    client: &'a dyn ChatClient,
    model: String,
    sampling: SamplingParams,
    policy: RetryPolicy,
    dump_dir: Option<PathBuf>,
}

impl<'a> StructuredRetriever<'a> {
    pub fn new(
        client: &'a dyn ChatClient,
        model: &str,
        sampling: SamplingParams,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            sampling,
            policy,
            dump_dir: None,
        }
    }

    /// Write every exchange to `{dir}/last_exchange.txt`.
    pub fn with_dump_dir(mut self, dir: PathBuf) -> Self {
        self.dump_dir = Some(dir);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Make one call and classify the reply.
    pub fn attempt(&self, case_id: &str, attempt: u32, messages: &[ChatMessage]) -> Attempt {
        let completion = match self.client.complete(&self.model, messages, &self.sampling) {
            Ok(completion) => completion,
            Err(e) => {
                return Attempt {
                    outcome: AttemptOutcome::TerminalFailure(e),
                    tokens: 0,
                }
            }
        };

        if let Some(dir) = &self.dump_dir {
            diagnostic::dump_exchange(dir, case_id, attempt, messages, &completion.text);
        }

        let outcome = match parse_diagnosis_response(&completion.text) {
            Ok(parsed) => AttemptOutcome::Success(parsed),
            Err(e) => AttemptOutcome::RetriableFailure(e),
        };

        Attempt {
            outcome,
            tokens: completion.total_tokens,
        }
    }

    /// Retrieve a validated triple for one case. First success wins.
    pub fn retrieve(
        &self,
        case_id: &str,
        messages: &[ChatMessage],
    ) -> Result<Retrieval, RetrievalError> {
        if messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(RetrievalError::EmptyPrompt {
                case_id: case_id.to_string(),
            });
        }

        let max_attempts = self.policy.max_attempts;
        let mut total_tokens = 0u64;
        let mut last_error = ParseError::Empty;

        for attempt in 1..=max_attempts {
            let Attempt { outcome, tokens } = self.attempt(case_id, attempt, messages);
            total_tokens += tokens;

            match outcome {
                AttemptOutcome::Success(parsed) => {
                    tracing::debug!(
                        case = case_id,
                        attempt,
                        tokens = total_tokens,
                        "Valid response"
                    );
                    return Ok(Retrieval {
                        case_id: case_id.to_string(),
                        triple: parsed.triple,
                        document: parsed.document,
                        total_tokens,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::RetriableFailure(e) => {
                    tracing::warn!(
                        case = case_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Malformed response, retrying"
                    );
                    last_error = e;
                    if attempt < max_attempts && !self.policy.delay.is_zero() {
                        std::thread::sleep(self.policy.delay);
                    }
                }
                AttemptOutcome::TerminalFailure(source) => {
                    return Err(RetrievalError::Llm {
                        case_id: case_id.to_string(),
                        attempt,
                        source,
                    });
                }
            }
        }

        Err(RetrievalError::Exhausted {
            case_id: case_id.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }
}
