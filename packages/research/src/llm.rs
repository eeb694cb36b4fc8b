//! LLM gateway seam.
//!
//! The pipeline talks to a trait so tests can script responses. The real
//! implementation forwards to the `llm-client` crate, resolving model
//! aliases and wiring the run's cancellation into each call.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use llm_client::{ChatRequest, LlmClient, LlmError, Message, ModelAlias, ModelMap};
use tokio_util::sync::CancellationToken;

/// One request through the gateway.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub alias: ModelAlias,
    pub system: Option<String>,
    pub prompt: String,
    /// Override the alias preset.
    pub temperature: Option<f32>,
    /// Override the alias preset.
    pub max_output_tokens: Option<u32>,
    pub cancel: CancellationToken,
}

impl LlmRequest {
    pub fn new(alias: ModelAlias, prompt: impl Into<String>) -> Self {
        Self {
            alias,
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Gateway trait: one-shot generation and streamed deltas.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<String, LlmError>;

    /// Stream text deltas. The stream ends after the final delta; errors
    /// terminate it.
    async fn stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError>;
}

/// The production gateway over an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct Gateway {
    client: LlmClient,
    models: ModelMap,
}

impl Gateway {
    pub fn new(client: LlmClient, models: ModelMap) -> Self {
        Self { client, models }
    }

    fn build_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut chat = self.models.request(request.alias);
        if let Some(temperature) = request.temperature {
            chat = chat.temperature(temperature);
        }
        if let Some(max) = request.max_output_tokens {
            chat = chat.max_tokens(max);
        }
        if let Some(system) = &request.system {
            chat = chat.message(Message::system(system));
        }
        chat.message(Message::user(&request.prompt))
    }
}

#[async_trait]
impl Llm for Gateway {
    async fn generate(&self, request: LlmRequest) -> Result<String, LlmError> {
        let chat = self.build_request(&request);
        let response = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => return Err(LlmError::Cancelled),
            response = self.client.chat(chat) => response?,
        };
        Ok(response.text().unwrap_or_default().to_string())
    }

    async fn stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let chat = self.build_request(&request);
        let cancel = request.cancel.clone();

        let stream = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => return Err(LlmError::Cancelled),
            stream = self.client.chat_stream(chat) => stream?,
        };

        let deltas = stream
            .take_until(cancel.cancelled_owned())
            .filter_map(|item| async move {
                match item {
                    Ok(delta) if delta.done => None,
                    Ok(delta) => Some(Ok(delta.text)),
                    Err(err) => Some(Err(err)),
                }
            });

        Ok(deltas.boxed())
    }
}
