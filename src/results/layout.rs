use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::pipeline::{Persona, PromptOptions};

/// Directory/file naming for one experiment run.
///
/// ```text
/// {output_root}/result_{model}[_POT]/{task}/rep{n}/
///   {task}_rep{n}.csv
///   {case_id}.json
///   last_exchange.txt
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLayout {
    pub task: String,
    pub run_dir: PathBuf,
    pub csv_path: PathBuf,
}

impl RunLayout {
    pub fn new(
        output_root: &Path,
        model: &str,
        prompt_version: &str,
        options: &PromptOptions,
        repetition: u32,
    ) -> Self {
        let task = task_name(prompt_version, options);
        let run_dir = output_root
            .join(result_root_name(model, options.persona))
            .join(&task)
            .join(format!("rep{repetition}"));
        let csv_path = run_dir.join(format!("{task}_rep{repetition}.csv"));

        Self {
            task,
            run_dir,
            csv_path,
        }
    }

    /// Path of the per-case JSON file.
    pub fn case_json_path(&self, case_id: &str) -> PathBuf {
        self.run_dir.join(format!("{}.json", sanitize_file_stem(case_id)))
    }
}

/// `ER_3DDX_{version}_{WithThoughts|NoThoughts}[_LR]`
pub fn task_name(prompt_version: &str, options: &PromptOptions) -> String {
    format!(
        "ER_3DDX_{}_{}{}",
        prompt_version,
        thoughts_label(options.with_thoughts),
        if options.with_lab_results { "_LR" } else { "" }
    )
}

/// `result_{model with '-' replaced by '_'}`, plus `_POT` for the panel persona.
pub fn result_root_name(model: &str, persona: Persona) -> String {
    let suffix = match persona {
        Persona::Single => "",
        Persona::Panel => "_POT",
    };
    format!("result_{}{}", model.replace('-', "_"), suffix)
}

pub fn thoughts_label(with_thoughts: bool) -> &'static str {
    if with_thoughts {
        "WithThoughts"
    } else {
        "NoThoughts"
    }
}

pub fn lab_results_label(with_lab_results: bool) -> &'static str {
    if with_lab_results {
        "WithLabResults"
    } else {
        "NoLabResults"
    }
}

fn unsafe_file_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9 ._-]").expect("static regex"))
}

/// Make a case identifier safe to use as a file name.
pub fn sanitize_file_stem(case_id: &str) -> String {
    let cleaned = unsafe_file_chars().replace_all(case_id.trim(), "_");
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        stem => stem.to_string(),
    }
}
