//! OpenAI-compatible chat client.
//!
//! A minimal REST client for chat completions, streaming and non-streaming,
//! with role-based model aliases. No domain logic lives here; the research
//! pipeline builds prompts and interprets responses.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_client::{LlmClient, Message, ModelAlias, ModelMap};
//!
//! let client = LlmClient::from_env()?;
//! let models = ModelMap::from_env();
//!
//! let response = client
//!     .chat(models.request(ModelAlias::Plan).message(Message::user("Hello")))
//!     .await?;
//! ```

pub mod aliases;
pub mod error;
pub mod streaming;
pub mod types;

pub use aliases::{ModelAlias, ModelMap};
pub use error::{LlmError, Result};
pub use streaming::{CompletionDelta, CompletionStream};
pub use types::{ChatRequest, ChatResponse, Choice, Message, Usage};

use reqwest::Client;
use tracing::debug;

/// Chat completion client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// Create a client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from the `LLM_API_KEY` environment variable, honoring an
    /// optional `LLM_BASE_URL` override.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| LlmError::Config("LLM_API_KEY not set".into()))?;
        let mut client = Self::new(api_key);
        if let Ok(base) = std::env::var("LLM_BASE_URL") {
            client = client.with_base_url(base);
        }
        Ok(client)
    }

    /// Point the client at a different base URL (proxy, gateway, Azure).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client (shared pools, custom timeouts).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        debug!(model = %request.model, messages = request.messages.len(), "chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Cancelled
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_response(status.as_u16(), &body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))
    }

    /// Streaming chat completion. Forces `stream: true` on the request.
    pub async fn chat_stream(&self, mut request: ChatRequest) -> Result<CompletionStream> {
        request.stream = true;
        debug!(model = %request.model, messages = request.messages.len(), "streaming chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Cancelled
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_response(status.as_u16(), &body));
        }

        Ok(CompletionStream::new(response.bytes_stream()))
    }
}
