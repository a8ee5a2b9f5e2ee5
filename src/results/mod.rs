//! Result persistence: one JSON file per case and an append-only CSV per
//! run/repetition.
//!
//! A row is only ever written for a validated retrieval; nothing here
//! updates or deletes earlier rows.

pub mod layout;
pub mod store;

pub use layout::*;
pub use store::*;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::Retrieval;

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Failed to create result directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One CSV row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRecord {
    #[serde(rename = "Case")]
    pub case: String,
    pub t1: String,
    pub t2: String,
    pub t3: String,
    #[serde(rename = "Tokens")]
    pub tokens: u64,
}

impl From<&Retrieval> for ResultRecord {
    fn from(retrieval: &Retrieval) -> Self {
        Self {
            case: retrieval.case_id.clone(),
            t1: retrieval.triple.top1.clone(),
            t2: retrieval.triple.top2.clone(),
            t3: retrieval.triple.top3.clone(),
            tokens: retrieval.total_tokens,
        }
    }
}
