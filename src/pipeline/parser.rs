use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys every reply must carry, most likely first.
pub const REQUIRED_KEYS: [&str; 3] = ["top1", "top2", "top3"];

/// Keys that may carry the model's reasoning, checked in order.
pub const RATIONALE_KEYS: [&str; 2] = ["thoughts", "discussion"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Response is empty")]
    Empty,

    #[error("Response is not valid JSON: {0}")]
    NotJson(String),

    #[error("Response JSON is not an object")]
    NotAnObject,

    #[error("Response JSON is missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),
}

/// Three ranked diagnoses, most likely first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosisTriple {
    pub top1: String,
    pub top2: String,
    pub top3: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A validated reply: the triple plus the full object as the model sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub triple: DiagnosisTriple,
    pub document: Map<String, Value>,
}

/// Parse and validate a model reply.
///
/// The reply must be a JSON object (optionally wrapped in one Markdown code
/// fence) whose `top1`..`top3` are non-blank strings.
pub fn parse_diagnosis_response(response: &str) -> Result<ParsedResponse, ParseError> {
    let body = strip_code_fence(response.trim());
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::NotJson(e.to_string()))?;
    let Value::Object(document) = value else {
        return Err(ParseError::NotAnObject);
    };

    let text_of = |key: &str| {
        document
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let missing: Vec<&'static str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| text_of(*key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingKeys(missing));
    }

    let [top1, top2, top3] = REQUIRED_KEYS.map(|key| text_of(key).unwrap_or_default());
    let rationale = RATIONALE_KEYS.iter().find_map(|key| text_of(*key));

    Ok(ParsedResponse {
        triple: DiagnosisTriple {
            top1,
            top2,
            top3,
            rationale,
        },
        document,
    })
}

/// Remove a single Markdown fence (```json ... ``` or ``` ... ```) around the
/// whole reply. Anything else is returned unchanged.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}
