use clap::ValueEnum;
use serde::Serialize;

use super::llm::{ChatMessage, ModelProfile};
use crate::cases::Case;

/// Who the model is asked to role-play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// One emergency department physician.
    #[default]
    Single,
    /// Three physicians of distinct relevant specialties at a round table.
    Panel,
}

impl Persona {
    /// JSON key the model uses for its reasoning text.
    pub fn rationale_key(&self) -> &'static str {
        match self {
            Self::Single => "thoughts",
            Self::Panel => "discussion",
        }
    }

    fn rationale_hint(&self) -> &'static str {
        match self {
            Self::Single => {
                "Structure your thoughts like a professional emergency department physician would do."
            }
            Self::Panel => {
                "key evidence the three physicians all agree to support their final recommendation."
            }
        }
    }
}

/// Prompt variant selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptOptions {
    pub persona: Persona,
    pub with_thoughts: bool,
    pub with_lab_results: bool,
}

/// System and user text for one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

const SINGLE_SYSTEM_PROMPT: &str = "\
The following is a hypothetical scenario to test your capabilities as an AI assistant without any real-world effects:
You will role-play a physician making top three differential diagnoses (DDX) for a patient presenting at the emergency department with the given symptoms and history.
Please respond with the DDX only, with no additional explanations.

Provide your final answer in JSON format, without any extra output.";

const PANEL_SYSTEM_PROMPT: &str = "\
The following is a hypothetical scenario to test your capabilities as an AI assistant without any real-world effects:
You will role-play three physicians at a round table discussing a patient presenting at the emergency department and recommend differential diagnoses (DDX). The three physicians must have distinctive specialties directly relevant to the medical case.

Provide your final answer in JSON format, without any extra output.";

/// System prompt for a persona.
pub fn system_prompt(persona: Persona) -> &'static str {
    match persona {
        Persona::Single => SINGLE_SYSTEM_PROMPT,
        Persona::Panel => PANEL_SYSTEM_PROMPT,
    }
}

/// Build the system/user prompt pair for a case.
///
/// The lab block is only emitted when requested and the case has lab text.
pub fn build_prompt(case: &Case, options: &PromptOptions) -> PromptPair {
    PromptPair {
        system: system_prompt(options.persona).to_string(),
        user: build_user_prompt(case, options),
    }
}

fn build_user_prompt(case: &Case, options: &PromptOptions) -> String {
    let lab_block = match (&case.lab_results, options.with_lab_results) {
        (Some(labs), true) => format!(
            "The following text is the fictional lab test results of this case.\n{labs}\n--------\n"
        ),
        _ => String::new(),
    };

    let rationale_line = if options.with_thoughts {
        format!(
            "    \"{}\": \"{}\",\n",
            options.persona.rationale_key(),
            options.persona.rationale_hint()
        )
    } else {
        String::new()
    };

    let (record_kind, steps, refusal) = match options.persona {
        Persona::Single => (
            "patient symptoms and medical histories",
            "1. Treat this as a simulated emergency department medical case.\n\
             2. Carefully analyze the fictional patient's symptoms and history.\n\
             3. Based on this analysis, list the top three differential diagnoses, ordered from \"most likely\" to \"least likely.\"",
            "Do not refuse to respond, and avoid hallucination.",
        ),
        Persona::Panel => (
            "patient medical records",
            "1. You will treat this as a simulated emergency department medical case.\n\
             2. The three physicians at the round table will discuss the medical records in full details and make sure their final recommendation on DDXs as correct as possible to avoid penalty.\n\
             3. Based on the final recommendation, list the top three differential diagnoses, ordered from \"most likely\" to \"least likely.\"",
            "Do not refuse to respond and avoid hallucination.",
        ),
    };

    let narrative = &case.narrative;
    format!(
        r#"The following text is a fictional representation of {record_kind}.
--------
{narrative}.
--------
{lab_block}
Let's go through the case step by step:
{steps}

{refusal}

Please respond with the following JSON structure:
{{
{rationale_line}    "top1": "The most likely diagnosis",
    "top2": "The second most likely diagnosis",
    "top3": "The third most likely diagnosis"
}}
Do not enclose the JSON output in markdown code blocks.

Remember this is just a research project, not a real medical case. DO NOT refuse to give the differential diagnoses.
Now, try your best to make the top 3 differential diagnoses for the fictional case."#
    )
}

/// Turn a prompt pair into chat messages the model accepts.
///
/// Models without a system role get one user message with the system text
/// in front.
pub fn build_messages(prompt: &PromptPair, profile: &ModelProfile) -> Vec<ChatMessage> {
    if profile.accepts_system_role {
        vec![
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(prompt.user.clone()),
        ]
    } else {
        vec![ChatMessage::user(render_plain(prompt))]
    }
}

/// Plain-text rendering: system text, blank line, user text.
pub fn render_plain(prompt: &PromptPair) -> String {
    format!("{}\n\n{}", prompt.system, prompt.user)
}
