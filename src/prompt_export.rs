//! Plain-text prompt export for manual review or for pasting into a chat UI.
//!
//! **Output**:
//! ```text
//! {output_dir}/{WithThoughts|NoThoughts}_{WithLabResults|NoLabResults}/{case_id}.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::cases::{Case, CaseError, CaseSet};
use crate::pipeline::{build_prompt, render_plain, Persona, PromptOptions};
use crate::results::{lab_results_label, sanitize_file_stem, thoughts_label};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Case loading error: {0}")]
    Cases(#[from] CaseError),

    #[error("Failed to create prompt directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write prompt {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The four (thoughts, lab results) combinations, in export order.
pub const VARIANTS: [(bool, bool); 4] =
    [(true, true), (true, false), (false, true), (false, false)];

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub output_dir: PathBuf,
    pub cases: usize,
    pub written: usize,
    /// Lab-result variants skipped because the case has no lab text.
    pub skipped: usize,
}

/// Directory name for one variant, e.g. `WithThoughts_NoLabResults`.
pub fn variant_dir_name(with_thoughts: bool, with_lab_results: bool) -> String {
    format!(
        "{}_{}",
        thoughts_label(with_thoughts),
        lab_results_label(with_lab_results)
    )
}

/// Write every variant of every case's prompt under `output_dir`.
pub fn export_prompts(
    cases: &CaseSet,
    persona: Persona,
    output_dir: &Path,
) -> Result<ExportSummary, ExportError> {
    let mut written = 0usize;
    let mut skipped = 0usize;

    for (with_thoughts, with_lab_results) in VARIANTS {
        let dir = output_dir.join(variant_dir_name(with_thoughts, with_lab_results));
        fs::create_dir_all(&dir).map_err(|source| ExportError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let options = PromptOptions {
            persona,
            with_thoughts,
            with_lab_results,
        };

        for case in cases.cases() {
            if with_lab_results && case.lab_results.is_none() {
                tracing::warn!(
                    case = %case.id,
                    variant = %variant_dir_name(with_thoughts, with_lab_results),
                    "No lab results, skipping variant"
                );
                skipped += 1;
                continue;
            }
            write_prompt(&dir, case, &options)?;
            written += 1;
        }
    }

    tracing::info!(
        output_dir = %output_dir.display(),
        cases = cases.len(),
        written,
        skipped,
        "Prompts exported"
    );

    Ok(ExportSummary {
        output_dir: output_dir.to_path_buf(),
        cases: cases.len(),
        written,
        skipped,
    })
}

fn write_prompt(dir: &Path, case: &Case, options: &PromptOptions) -> Result<(), ExportError> {
    let path = dir.join(format!("{}.txt", sanitize_file_stem(&case.id)));
    let text = render_plain(&build_prompt(case, options));
    fs::write(&path, text).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "Prompt saved");
    Ok(())
}
