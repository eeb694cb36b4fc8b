//! Model aliases for pipeline roles.
//!
//! The pipeline never names concrete models; it asks for a role (plan,
//! answer, verify, reasoning) and the alias map resolves it to whatever the
//! deployment configured. Each role also carries a sampling preset.

use crate::types::ChatRequest;

/// Pipeline role for a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelAlias {
    /// Deterministic, short output (query planning)
    Plan,
    /// Low temperature, streamed (answer synthesis)
    Answer,
    /// Deterministic, strict JSON output (claim verification)
    Verify,
    /// Low temperature, may use hidden reasoning
    Reasoning,
}

impl ModelAlias {
    /// Default sampling temperature for the role.
    pub fn temperature(&self) -> f32 {
        match self {
            ModelAlias::Plan | ModelAlias::Verify => 0.0,
            ModelAlias::Answer => 0.2,
            ModelAlias::Reasoning => 0.3,
        }
    }

    /// Default completion cap for the role.
    pub fn max_tokens(&self) -> u32 {
        match self {
            ModelAlias::Plan => 512,
            ModelAlias::Verify => 2048,
            ModelAlias::Answer | ModelAlias::Reasoning => 4096,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelAlias::Plan => "plan",
            ModelAlias::Answer => "answer",
            ModelAlias::Verify => "verify",
            ModelAlias::Reasoning => "reasoning",
        }
    }
}

/// Maps pipeline roles to concrete model identifiers.
#[derive(Debug, Clone)]
pub struct ModelMap {
    pub plan: String,
    pub answer: String,
    pub verify: String,
    pub reasoning: String,
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            plan: "gpt-4o-mini".to_string(),
            answer: "gpt-4o".to_string(),
            verify: "gpt-4o-mini".to_string(),
            reasoning: "gpt-4o".to_string(),
        }
    }
}

impl ModelMap {
    /// Build from environment, falling back to defaults per role.
    ///
    /// Recognizes `LLM_MODEL_PLAN`, `LLM_MODEL_ANSWER`, `LLM_MODEL_VERIFY`,
    /// `LLM_MODEL_REASONING`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            plan: std::env::var("LLM_MODEL_PLAN").unwrap_or(defaults.plan),
            answer: std::env::var("LLM_MODEL_ANSWER").unwrap_or(defaults.answer),
            verify: std::env::var("LLM_MODEL_VERIFY").unwrap_or(defaults.verify),
            reasoning: std::env::var("LLM_MODEL_REASONING").unwrap_or(defaults.reasoning),
        }
    }

    /// Resolve an alias to its model identifier.
    pub fn resolve(&self, alias: ModelAlias) -> &str {
        match alias {
            ModelAlias::Plan => &self.plan,
            ModelAlias::Answer => &self.answer,
            ModelAlias::Verify => &self.verify,
            ModelAlias::Reasoning => &self.reasoning,
        }
    }

    /// Start a request preconfigured for the role.
    pub fn request(&self, alias: ModelAlias) -> ChatRequest {
        ChatRequest::new(self.resolve(alias))
            .temperature(alias.temperature())
            .max_tokens(alias.max_tokens())
    }
}
