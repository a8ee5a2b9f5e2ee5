//! Static model capability table.
//!
//! Reasoning models reject the system role and sampling parameters; every
//! other model gets the standard chat request. Matching is by name prefix,
//! first match wins.

use serde::Serialize;

/// Request shape a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub family: &'static str,
    /// Accepts a `system` role message.
    pub accepts_system_role: bool,
    /// Accepts `max_tokens` / `temperature`.
    pub accepts_sampling: bool,
}

const CHAT_PROFILE: ModelProfile = ModelProfile {
    family: "chat",
    accepts_system_role: true,
    accepts_sampling: true,
};

const REASONING_PROFILE: ModelProfile = ModelProfile {
    family: "reasoning",
    accepts_system_role: false,
    accepts_sampling: false,
};

/// Known model name prefixes with non-default request shapes.
const MODEL_PROFILES: &[(&str, ModelProfile)] = &[
    ("o1", REASONING_PROFILE),
    ("o3", REASONING_PROFILE),
    ("o4", REASONING_PROFILE),
];

/// Look up the request profile for a model name.
pub fn profile_for(model: &str) -> ModelProfile {
    let name = model.trim().to_ascii_lowercase();
    MODEL_PROFILES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, profile)| *profile)
        .unwrap_or(CHAT_PROFILE)
}
