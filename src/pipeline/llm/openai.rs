use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{ChatClient, ChatMessage, Completion, SamplingParams};
use super::LlmError;

/// Request timeout, matching the vendor SDK default.
pub const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Extra sends after a transient failure (connection, timeout, 408/409/429, 5xx).
pub const TRANSIENT_RETRIES: u32 = 2;

/// First pause before resending; doubles on each further retry.
pub const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Transient failures are resent here, at most [`TRANSIENT_RETRIES`] times.
/// Anything else (400, 401, unreadable envelope) is returned on first sight.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    retry_backoff: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
            retry_backoff: INITIAL_RETRY_BACKOFF,
        })
    }

    /// Override the first backoff pause.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Client with the default request timeout.
    pub fn with_default_timeout(base_url: &str, api_key: &str) -> Result<Self, LlmError> {
        Self::new(base_url, api_key, REQUEST_TIMEOUT_SECS)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response body from `/chat/completions`
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiClient {
    /// One POST, no retry.
    fn send_once(
        &self,
        url: &str,
        body: &ChatCompletionRequest<'_>,
    ) -> Result<Completion, LlmError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyChoices)?;

        Ok(Completion {
            // A refusal or filtered reply has null content: treat as empty text
            // so the caller's validation decides what to do with it.
            text: choice.message.content.unwrap_or_default(),
            total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

impl ChatClient for OpenAiClient {
    fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        };

        let mut backoff = self.retry_backoff;
        let mut retry = 0;
        loop {
            match self.send_once(&url, &body) {
                Err(e) if e.is_transient() && retry < TRANSIENT_RETRIES => {
                    retry += 1;
                    tracing::warn!(
                        retry,
                        max_retries = TRANSIENT_RETRIES,
                        wait_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Chat-completion call failed, resending"
                    );
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                result => return result,
            }
        }
    }
}
