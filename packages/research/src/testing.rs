//! Mock implementations for tests: scripted LLM, searcher and reader.
//!
//! No network, deterministic, call-tracked. These back both the unit tests
//! in this crate and downstream integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use llm_client::{LlmError, ModelAlias};

use crate::error::{ReadError, SearchError};
use crate::llm::{Llm, LlmRequest};
use crate::reader::{ReadFrom, ReadOptions, ReadPage, Reader};
use crate::search::{ProviderHit, SearchOptions, SearchProvider};

/// A scripted LLM response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Return (or stream) this text.
    Text(String),
    /// Fail with a rate-limit error.
    RateLimited,
    /// Fail with a context-too-large error.
    ContextTooLarge,
    /// Fail with a generic API error.
    Fail(String),
}

impl ScriptedResponse {
    fn into_result(self) -> Result<String, LlmError> {
        match self {
            ScriptedResponse::Text(text) => Ok(text),
            ScriptedResponse::RateLimited => Err(LlmError::RateLimited("scripted".into())),
            ScriptedResponse::ContextTooLarge => {
                Err(LlmError::ContextTooLarge("scripted".into()))
            }
            ScriptedResponse::Fail(message) => Err(LlmError::Api {
                status: 500,
                message,
            }),
        }
    }
}

/// LLM mock with per-alias response queues.
///
/// An exhausted queue yields an empty string, which downstream parsers
/// treat as a parse failure and recover from.
#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<HashMap<ModelAlias, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<ModelAlias>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for an alias.
    pub fn with_response(self, alias: ModelAlias, response: ScriptedResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(alias)
            .or_default()
            .push_back(response);
        self
    }

    /// Queue a plain text response for an alias.
    pub fn with_text(self, alias: ModelAlias, text: impl Into<String>) -> Self {
        self.with_response(alias, ScriptedResponse::Text(text.into()))
    }

    /// Aliases called so far, in order.
    pub fn calls(&self) -> Vec<ModelAlias> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, alias: ModelAlias) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(alias);
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&alias).and_then(VecDeque::pop_front) {
            Some(scripted) => scripted.into_result(),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn generate(&self, request: LlmRequest) -> Result<String, LlmError> {
        if request.cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.next(request.alias)
    }

    async fn stream(
        &self,
        request: LlmRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        if request.cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let text = self.next(request.alias)?;
        // Stream word-by-word to exercise delta accumulation.
        let deltas: Vec<Result<String, LlmError>> = split_into_deltas(&text)
            .into_iter()
            .map(Ok)
            .collect();
        Ok(futures::stream::iter(deltas).boxed())
    }
}

fn split_into_deltas(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut deltas = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c.is_whitespace() && current.len() >= 4 {
            deltas.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        deltas.push(current);
    }
    deltas
}

/// Search provider mock. Returns the configured hits for every query
/// unless a per-query override exists.
#[derive(Default)]
pub struct MockSearcher {
    default_hits: Vec<ProviderHit>,
    by_query: HashMap<String, Vec<ProviderHit>>,
    calls: Mutex<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits returned for any query.
    pub fn with_urls(mut self, urls: &[&str]) -> Self {
        self.default_hits = urls
            .iter()
            .map(|url| ProviderHit {
                url: url.to_string(),
                title: Some(format!("Title of {url}")),
                snippet: None,
                score: None,
                published_at: None,
            })
            .collect();
        self
    }

    /// Hits returned for one specific query.
    pub fn with_query_urls(mut self, query: &str, urls: &[&str]) -> Self {
        self.by_query.insert(
            query.to_string(),
            urls.iter()
                .map(|url| ProviderHit {
                    url: url.to_string(),
                    title: Some(format!("Title of {url}")),
                    snippet: None,
                    score: None,
                    published_at: None,
                })
                .collect(),
        );
        self
    }

    /// Queries seen so far.
    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearcher {
    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ProviderHit>, SearchError> {
        if opts.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        self.calls.lock().unwrap().push(query.to_string());
        Ok(self
            .by_query
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default_hits.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Reader mock: URL → page text. Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct MockReader {
    pages: HashMap<String, String>,
    reads: Mutex<Vec<String>>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for `url` (compared on the canonical form).
    pub fn with_page(mut self, url: &str, text: &str) -> Self {
        let key = crate::canonical::canonicalize_url(url).unwrap_or_else(|_| url.to_string());
        self.pages.insert(key, text.to_string());
        self
    }

    /// URLs read so far.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reader for MockReader {
    async fn read(&self, url: &str, opts: &ReadOptions) -> Result<ReadPage, ReadError> {
        if opts.cancel.is_cancelled() {
            return Err(ReadError::Cancelled);
        }
        let key = crate::canonical::canonicalize_url(url)
            .map_err(|_| ReadError::InvalidUrl { url: url.to_string() })?;
        self.reads.lock().unwrap().push(key.clone());

        match self.pages.get(&key) {
            Some(text) => Ok(ReadPage {
                text: text.clone(),
                html: None,
                final_url: Some(key),
                title: Some("Mock Page".to_string()),
                lang: Some("en".to_string()),
                content_type: Some("text/html".to_string()),
                http_status: Some(200),
                from: ReadFrom::Raw,
            }),
            None => Err(ReadError::Status {
                status: 404,
                url: key,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_llm_pops_responses_in_order() {
        let llm = MockLlm::new()
            .with_text(ModelAlias::Plan, "first")
            .with_text(ModelAlias::Plan, "second");

        let a = llm.generate(LlmRequest::new(ModelAlias::Plan, "x")).await.unwrap();
        let b = llm.generate(LlmRequest::new(ModelAlias::Plan, "x")).await.unwrap();
        let c = llm.generate(LlmRequest::new(ModelAlias::Plan, "x")).await.unwrap();
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("first", "second", ""));
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn mock_llm_streams_concatenate_to_text() {
        let llm = MockLlm::new().with_text(ModelAlias::Answer, "one two three four");
        let stream = llm
            .stream(LlmRequest::new(ModelAlias::Answer, "x"))
            .await
            .unwrap();
        let deltas: Vec<String> = stream.map(|d| d.unwrap()).collect().await;
        assert!(deltas.len() > 1);
        assert_eq!(deltas.concat(), "one two three four");
    }

    #[tokio::test]
    async fn mock_reader_serves_canonical_urls() {
        let reader = MockReader::new().with_page("https://Example.com/a?utm_source=x", "body");
        let page = reader
            .read("https://example.com/a", &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(page.text, "body");
    }
}
