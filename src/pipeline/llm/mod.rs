pub mod types;
pub mod openai;
pub mod model_profile;
#[cfg(test)]
pub mod mock;

pub use types::*;
pub use openai::*;
pub use model_profile::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Chat-completion endpoint is not reachable at {0}")]
    Connection(String),

    #[error("Chat-completion API returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Chat-completion request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Chat-completion response contained no choices")]
    EmptyChoices,
}

impl LlmError {
    /// Failures worth repeating the same request for: unreachable endpoint,
    /// timeout, 408/409/429 and any 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => matches!(*status, 408 | 409 | 429) || *status >= 500,
            Self::HttpClient(_) | Self::ResponseParsing(_) | Self::EmptyChoices => false,
        }
    }
}
