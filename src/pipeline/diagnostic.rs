//! Exchange dump: the last prompt/reply pair written to disk.
//!
//! The file is overwritten on every attempt, so after a crash or a terminal
//! failure it shows exactly what the model sent back last.
//!
//! **Output**:
//! ```text
//! {run_dir}/last_exchange.txt
//! ```

use std::fmt::Write as _;
use std::path::Path;

use chrono::Utc;

use super::llm::ChatMessage;

/// File name of the exchange dump inside the run directory.
pub const EXCHANGE_FILE: &str = "last_exchange.txt";

/// Write a text artifact.
///
/// Logs on success (debug) and failure (warn). Never panics.
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Exchange dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Exchange dump: failed to write text"
        ),
    }
}

/// Format one prompt/reply exchange.
pub fn format_exchange(
    case_id: &str,
    attempt: u32,
    messages: &[ChatMessage],
    response: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Case: {case_id}");
    let _ = writeln!(out, "Attempt: {attempt}");
    let _ = writeln!(out, "Recorded: {}", Utc::now().to_rfc3339());
    for message in messages {
        let _ = writeln!(out, "\n[{} prompt]\n{}", message.role.as_str(), message.content);
    }
    let _ = writeln!(out, "\n[Raw API response]\n{response}");
    out
}

/// Overwrite the exchange dump in `dir`.
pub fn dump_exchange(
    dir: &Path,
    case_id: &str,
    attempt: u32,
    messages: &[ChatMessage],
    response: &str,
) {
    dump_text(
        dir,
        EXCHANGE_FILE,
        &format_exchange(case_id, attempt, messages, response),
    );
}
