//! Typed errors for the research pipeline.
//!
//! Uses `thiserror` per layer; the orchestrator decides which failures
//! degrade and which terminate a run.

use thiserror::Error;

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Page read failed
    #[error("read failed: {0}")]
    Read(#[from] ReadError),

    /// Web search failed
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// LLM call failed
    #[error("LLM error: {0}")]
    Llm(#[from] llm_client::LlmError),

    /// Database operation failed
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be parsed or canonicalized
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Derived timeout elapsed
    #[error("timed out: {what}")]
    Timeout { what: String },

    /// Malformed request input
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl ResearchError {
    /// Cancellation (including timeouts wrapped as cancellation) is kept
    /// silent; everything else surfaces as an error event.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ResearchError::Cancelled
                | ResearchError::Llm(llm_client::LlmError::Cancelled)
                | ResearchError::Search(SearchError::Cancelled)
                | ResearchError::Read(ReadError::Cancelled)
        )
    }
}

/// Errors from fetching and cleaning a page.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream returned a non-success status
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Content type cannot be converted to text (pdf, images, media)
    #[error("binary content ({content_type}) at {url}")]
    BinaryContent { content_type: String, url: String },

    /// Body exceeded the configured byte cap
    #[error("response exceeded {max_bytes} bytes at {url}")]
    TooLarge { max_bytes: usize, url: String },

    /// URL could not be normalized
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Read was cancelled or timed out
    #[error("read cancelled")]
    Cancelled,
}

impl ReadError {
    /// Binary content is terminal per URL: no retry, no fallback.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadError::BinaryContent { .. } | ReadError::InvalidUrl { .. })
    }
}

/// Errors from the search adapter.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider returned a non-success status
    #[error("provider status {status}: {message}")]
    Provider { status: u16, message: String },

    /// Provider response could not be decoded
    #[error("bad provider response: {0}")]
    Decode(String),

    /// Search was cancelled or timed out
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// 429 and 5xx are worth retrying; 400/401/404 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(_) => true,
            SearchError::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ResearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SearchError::Provider { status: 429, message: String::new() }.is_transient());
        assert!(SearchError::Provider { status: 503, message: String::new() }.is_transient());
        assert!(!SearchError::Provider { status: 401, message: String::new() }.is_transient());
        assert!(!SearchError::Provider { status: 404, message: String::new() }.is_transient());
    }

    #[test]
    fn binary_is_terminal() {
        let err = ReadError::BinaryContent {
            content_type: "application/pdf".into(),
            url: "https://example.com/a.pdf".into(),
        };
        assert!(err.is_terminal());
        assert!(!ReadError::Http("reset".into()).is_terminal());
    }

    #[test]
    fn cancellation_is_silent() {
        assert!(ResearchError::Cancelled.is_cancellation());
        assert!(ResearchError::Llm(llm_client::LlmError::Cancelled).is_cancellation());
        assert!(ResearchError::Search(SearchError::Cancelled).is_cancellation());
        assert!(ResearchError::Read(ReadError::Cancelled).is_cancellation());
        assert!(!ResearchError::InvalidInput { reason: "x".into() }.is_cancellation());
    }
}
