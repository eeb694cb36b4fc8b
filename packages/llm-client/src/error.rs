//! Typed errors for the LLM client.
//!
//! Budget failures (rate limits, oversized prompts) get their own variants so
//! callers can react differently than to plain transport errors.

use thiserror::Error;

/// Errors returned by the chat client.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client misconfiguration (missing key, bad base URL)
    #[error("config error: {0}")]
    Config(String),

    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP response from the provider
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider rate limit (HTTP 429, including token-per-minute limits)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Prompt exceeds the model's context window
    #[error("context too large: {0}")]
    ContextTooLarge(String),

    /// Malformed provider response
    #[error("parse error: {0}")]
    Parse(String),

    /// Request was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether a retry with the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::RateLimited(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure is a token-budget problem that shrinking the
    /// prompt could fix.
    pub fn is_budget(&self) -> bool {
        matches!(self, LlmError::RateLimited(_) | LlmError::ContextTooLarge(_))
    }

    /// Classify a non-success provider response.
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 429 {
            return LlmError::RateLimited(truncate(body, 300));
        }
        let lower = body.to_ascii_lowercase();
        if status == 400
            && (lower.contains("context length")
                || lower.contains("too large")
                || lower.contains("maximum prompt")
                || lower.contains("tokens per min"))
        {
            return LlmError::ContextTooLarge(truncate(body, 300));
        }
        LlmError::Api {
            status,
            message: truncate(body, 300),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, LlmError>;
