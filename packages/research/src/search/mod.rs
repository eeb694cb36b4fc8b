//! Web search: provider seam plus the retry/loosen/fallback policy.
//!
//! Providers return raw hits; the adapter owns everything that makes them
//! usable: transient retries with backoff, query loosening when a strict
//! query finds nothing, an optional fallback provider, hostname allow/deny
//! filtering, and canonicalized first-seen dedup.

pub mod tavily;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::canonical::{canonicalize_url, domain_of, host_matches};
use crate::error::SearchError;
use crate::types::TimeRange;
use crate::util::retry_backoff;

/// A canonicalized search result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Options for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub size: usize,
    pub time_range: Option<TimeRange>,
    pub allowed_domains: Vec<String>,
    pub disallowed_domains: Vec<String>,
    pub region: Option<String>,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            size: 8,
            time_range: None,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            region: None,
            timeout: Duration::from_millis(crate::util::REQUEST_TIMEOUT_MS),
            cancel: CancellationToken::new(),
        }
    }
}

/// A raw hit as a provider reports it; URLs are not yet canonical.
#[derive(Debug, Clone)]
pub struct ProviderHit {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<f64>,
    pub published_at: Option<String>,
}

/// Seam over concrete search providers.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ProviderHit>, SearchError>;

    fn name(&self) -> &str;
}

/// Search policy over a primary provider and an optional fallback.
#[derive(Clone)]
pub struct SearchAdapter {
    primary: Arc<dyn SearchProvider>,
    fallback: Option<Arc<dyn SearchProvider>>,
}

impl SearchAdapter {
    pub fn new(primary: Arc<dyn SearchProvider>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SearchProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Run a search through the full policy, returning canonicalized,
    /// deduplicated hits.
    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = self.call(self.primary.as_ref(), query, opts).await?;

        if hits.is_empty() {
            let loose = loosen_query(query);
            let widened = SearchOptions {
                size: opts.size.max(1) * 2,
                allowed_domains: Vec::new(),
                disallowed_domains: Vec::new(),
                ..opts.clone()
            };
            debug!(query = %query, loosened = %loose, "strict search empty; retrying loosened");
            hits = self.call(self.primary.as_ref(), &loose, &widened).await?;
        }

        if hits.is_empty() {
            if let Some(fallback) = &self.fallback {
                debug!(provider = fallback.name(), "primary found nothing; trying fallback");
                hits = self.call(fallback.as_ref(), query, opts).await?;
            }
        }

        Ok(finalize_hits(hits, opts))
    }

    /// One provider call with transient-error retries (400ms base, ×2, two
    /// retries). 400/401/404 terminate immediately with an empty result
    /// path left to the caller.
    async fn call(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ProviderHit>, SearchError> {
        let result = retry_backoff(
            2,
            Duration::from_millis(400),
            &opts.cancel,
            SearchError::is_transient,
            |attempt| async move {
                if attempt > 0 {
                    debug!(provider = provider.name(), attempt, "retrying search");
                }
                provider.search(query, opts).await
            },
        )
        .await;

        match result {
            Ok(hits) => Ok(hits),
            Err(err @ SearchError::Cancelled) => Err(err),
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                // Non-retryable provider errors degrade to an empty result.
                warn!(provider = provider.name(), error = %err, "search provider error");
                Ok(Vec::new())
            }
        }
    }
}

/// Strip quotes and parens and collapse whitespace, for the retry pass.
fn loosen_query(query: &str) -> String {
    let stripped: String = query
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '(' | ')'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Post-filter by hostname, canonicalize, and dedupe preserving first-seen
/// order.
fn finalize_hits(hits: Vec<ProviderHit>, opts: &SearchOptions) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for hit in hits {
        let Ok(canonical) = canonicalize_url(&hit.url) else {
            continue;
        };
        let Some(host) = domain_of(&canonical) else {
            continue;
        };

        if !opts.allowed_domains.is_empty()
            && !opts.allowed_domains.iter().any(|d| host_matches(&host, d))
        {
            continue;
        }
        if opts.disallowed_domains.iter().any(|d| host_matches(&host, d)) {
            continue;
        }

        if seen.insert(canonical.clone()) {
            out.push(SearchHit {
                url: canonical,
                title: hit.title,
                snippet: hit.snippet,
                score: hit.score,
                published_at: hit.published_at,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: pops one response per call.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<ProviderHit>, SearchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Vec<ProviderHit>, SearchError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn search(
            &self,
            _query: &str,
            _opts: &SearchOptions,
        ) -> Result<Vec<ProviderHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn hit(url: &str) -> ProviderHit {
        ProviderHit {
            url: url.to_string(),
            title: Some(format!("title for {url}")),
            snippet: None,
            score: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn dedupes_canonicalized_urls_preserving_first_seen() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(vec![
            hit("https://Example.com/a?utm_source=x"),
            hit("https://example.com/a"),
            hit("https://example.com/b"),
        ])]));
        let adapter = SearchAdapter::new(provider);

        let hits = adapter
            .search("anything interesting", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://example.com/a");
        assert_eq!(hits[0].title.as_deref(), Some("title for https://Example.com/a?utm_source=x"));
    }

    #[tokio::test]
    async fn loosens_query_when_primary_is_empty() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![]),
            Ok(vec![hit("https://example.com/found")]),
        ]));
        let adapter = SearchAdapter::new(provider.clone());

        let hits = adapter
            .search("\"exact phrase\" (qualifier)", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_provider() {
        let primary = Arc::new(ScriptedProvider::new(vec![Ok(vec![]), Ok(vec![])]));
        let fallback = Arc::new(ScriptedProvider::new(vec![Ok(vec![hit(
            "https://fallback.example/x",
        )])]));
        let adapter = SearchAdapter::new(primary).with_fallback(fallback);

        let hits = adapter
            .search("hard to find", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://fallback.example/x");
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(SearchError::Provider {
                status: 503,
                message: "unavailable".into(),
            }),
            Ok(vec![hit("https://example.com/ok")]),
        ]));
        let adapter = SearchAdapter::new(provider.clone());

        let hits = adapter
            .search("flaky backend", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_degrade_to_empty() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(SearchError::Provider {
                status: 401,
                message: "bad key".into(),
            }),
            // Would be returned by the loosened retry.
            Err(SearchError::Provider {
                status: 401,
                message: "bad key".into(),
            }),
        ]));
        let adapter = SearchAdapter::new(provider.clone());

        let hits = adapter
            .search("unauthorized query", &SearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn domain_filters_apply_by_host_suffix() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(vec![
            hit("https://news.example.com/story"),
            hit("https://blog.other.org/post"),
            hit("https://spam.bad.net/junk"),
        ])]));
        let adapter = SearchAdapter::new(provider);

        let opts = SearchOptions {
            allowed_domains: vec!["example.com".into(), "other.org".into()],
            disallowed_domains: vec!["other.org".into()],
            ..Default::default()
        };
        let hits = adapter.search("filtered query", &opts).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://news.example.com/story");
    }

    #[test]
    fn loosen_strips_operators() {
        assert_eq!(
            loosen_query("\"NASA  Artemis\" (2024)   launch"),
            "NASA Artemis 2024 launch"
        );
    }
}
