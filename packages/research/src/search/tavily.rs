//! Tavily search provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ProviderHit, SearchOptions, SearchProvider};
use crate::error::SearchError;
use crate::secret::SecretKey;

#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    search_depth: String,
    max_results: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    score: Option<f64>,
    published_date: Option<String>,
}

/// Search provider backed by the Tavily API.
pub struct TavilySearcher {
    client: reqwest::Client,
    api_key: SecretKey,
    search_depth: String,
}

impl TavilySearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: SecretKey::new(api_key),
            search_depth: "basic".to_string(),
        }
    }

    /// Set search depth ("basic" or "advanced").
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearcher {
    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ProviderHit>, SearchError> {
        let request = TavilyRequest {
            query: query.to_string(),
            search_depth: self.search_depth.clone(),
            max_results: opts.size.clamp(1, 20),
            include_domains: opts.allowed_domains.clone(),
            exclude_domains: opts.disallowed_domains.clone(),
            start_date: opts.time_range.as_ref().and_then(|r| r.from.clone()),
            end_date: opts.time_range.as_ref().and_then(|r| r.to.clone()),
            country: opts.region.clone(),
        };

        let send = self
            .client
            .post("https://api.tavily.com/search")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .timeout(opts.timeout)
            .send();

        let response = tokio::select! {
            _ = opts.cancel.cancelled() => return Err(SearchError::Cancelled),
            result = send => result.map_err(|e| {
                if e.is_timeout() {
                    SearchError::Cancelled
                } else {
                    SearchError::Http(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(body
            .results
            .into_iter()
            .map(|r| ProviderHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
                score: r.score,
                published_at: r.published_date,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
