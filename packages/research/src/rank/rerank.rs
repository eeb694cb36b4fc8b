//! Optional cross-encoder reranking over an HTTP backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ResearchError, Result};
use crate::secret::SecretKey;

/// One reranked document: its index in the submitted list plus relevance.
#[derive(Debug, Clone)]
pub struct RerankScore {
    pub index: usize,
    /// Relevance in [0, 1].
    pub score: f64,
}

/// Seam over cross-encoder rerank backends.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<RerankScore>>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "relevance_score")]
    score: f64,
}

/// Cross-encoder reranker speaking the common `/v1/rerank` shape.
pub struct HttpReranker {
    client: Client,
    base_url: Url,
    model: String,
    api_key: Option<SecretKey>,
}

impl HttpReranker {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|_| ResearchError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            model: model.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: SecretKey) -> Self {
        self.api_key = Some(key);
        self
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<RerankScore>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = self
            .base_url
            .join("/v1/rerank")
            .map_err(|_| ResearchError::InvalidUrl {
                url: self.base_url.to_string(),
            })?;

        let mut request = self.client.post(endpoint).json(&RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResearchError::Llm(llm_client::LlmError::Network(e.to_string())))?
            .error_for_status()
            .map_err(|e| {
                ResearchError::Llm(llm_client::LlmError::Api {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                })
            })?;

        let parsed: RerankResponse = response.json().await.map_err(|e| {
            ResearchError::Llm(llm_client::LlmError::Parse(e.to_string()))
        })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|item| RerankScore {
                index: item.index,
                score: item.score.clamp(0.0, 1.0),
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_accepts_both_score_keys() {
        let body = r#"{"results":[{"index":0,"score":0.9},{"index":1,"relevance_score":0.4}]}"#;
        let parsed: RerankResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[1].index, 1);
        assert!((parsed.results[1].score - 0.4).abs() < 1e-9);
    }
}
