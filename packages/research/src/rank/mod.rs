//! Hybrid ranking: BM25 per subquery, optional cross-encoder rerank,
//! max-score fusion, per-source diversification.
//!
//! Degrades in layers: an empty FTS index is rebuilt from `chunks` and the
//! search retried; if that still finds nothing, a LIKE scan over recent
//! sources stands in.

pub mod rerank;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::store::Store;
use crate::types::ChunkHit;
use rerank::Reranker;

const MAX_MATCH_TOKENS: usize = 12;
const MAX_LIKE_TOKENS: usize = 8;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "that", "this", "from", "have", "has",
    "had", "not", "but", "all", "can", "her", "his", "its", "our", "out", "did", "does", "what",
    "when", "where", "which", "who", "why", "how", "about",
];

/// Options for one ranking pass.
#[derive(Debug, Clone)]
pub struct RankOptions {
    /// Total hits returned.
    pub cap: usize,
    /// BM25 candidates fetched per subquery.
    pub per_query_take: i64,
    /// Diversification limit per source.
    pub per_source_limit: usize,
    /// Use the cross-encoder when one is configured.
    pub enable_rerank: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            cap: 24,
            per_query_take: 12,
            per_source_limit: 3,
            enable_rerank: false,
        }
    }
}

/// The ranking engine.
#[derive(Clone)]
pub struct Ranker {
    store: Store,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Ranker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Rank chunks against a set of queries, best first.
    pub async fn rank_for_queries(
        &self,
        queries: &[String],
        opts: &RankOptions,
    ) -> Result<Vec<ChunkHit>> {
        let mut merged: HashMap<String, ChunkHit> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for query in queries {
            let hits = self.ranked_hits_for_query(query, opts).await?;
            for hit in hits {
                match merged.get_mut(&hit.id) {
                    Some(existing) => {
                        if hit.score > existing.score {
                            existing.score = hit.score;
                            existing.bm25 = hit.bm25;
                            existing.snippet = hit.snippet;
                        }
                    }
                    None => {
                        order.push(hit.id.clone());
                        merged.insert(hit.id.clone(), hit);
                    }
                }
            }
        }

        let mut hits: Vec<ChunkHit> = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .collect();

        if hits.is_empty() {
            hits = self.fallback_hits(queries, opts).await?;
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(diversify(hits, opts.cap, opts.per_source_limit))
    }

    /// BM25 hits for a single query, reranked when configured.
    async fn ranked_hits_for_query(
        &self,
        query: &str,
        opts: &RankOptions,
    ) -> Result<Vec<ChunkHit>> {
        let expr = fts_match_expr(query);
        let raw = self.store.fts_search(&expr, opts.per_query_take).await?;

        let mut hits: Vec<ChunkHit> = raw
            .into_iter()
            .map(|hit| ChunkHit {
                id: hit.chunk_id,
                source_id: hit.source_id,
                score: bm25_score(hit.rank),
                bm25: Some(hit.rank),
                snippet: hit.snippet,
                text: hit.text,
            })
            .collect();

        if opts.enable_rerank && !hits.is_empty() {
            if let Some(reranker) = &self.reranker {
                let documents: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
                match reranker.rerank(query, documents).await {
                    Ok(scores) => {
                        for item in scores {
                            if let Some(hit) = hits.get_mut(item.index) {
                                hit.score = item.score;
                            }
                        }
                        hits.sort_by(|a, b| {
                            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                        });
                    }
                    Err(err) => {
                        // Rerank is best-effort; BM25 order stands.
                        warn!(model = reranker.model_name(), error = %err, "rerank failed");
                    }
                }
            }
        }

        Ok(hits)
    }

    /// The degraded path when every per-query search came back empty:
    /// rebuild FTS if it lost its rows, retry, then fall back to LIKE.
    async fn fallback_hits(&self, queries: &[String], opts: &RankOptions) -> Result<Vec<ChunkHit>> {
        if self.store.fts_row_count().await? == 0 {
            debug!("FTS index empty; rebuilding from chunks");
            self.store.rebuild_fts().await?;

            for query in queries {
                let expr = fts_match_expr(query);
                let raw = self.store.fts_search(&expr, opts.per_query_take).await?;
                if !raw.is_empty() {
                    return Ok(raw
                        .into_iter()
                        .map(|hit| ChunkHit {
                            id: hit.chunk_id,
                            source_id: hit.source_id,
                            score: bm25_score(hit.rank),
                            bm25: Some(hit.rank),
                            snippet: hit.snippet,
                            text: hit.text,
                        })
                        .collect());
                }
            }
        }

        let mut terms: Vec<String> = Vec::new();
        for query in queries {
            for term in like_terms(query) {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }
        terms.truncate(MAX_LIKE_TOKENS);

        debug!(terms = terms.len(), "falling back to LIKE retrieval");
        Ok(self
            .store
            .like_search(&terms, opts.cap as i64)
            .await?
            .into_iter()
            .map(|hit| ChunkHit {
                id: hit.chunk_id,
                source_id: hit.source_id,
                text: hit.text,
                score: 0.5,
                bm25: None,
                snippet: None,
            })
            .collect())
    }
}

/// Build a tolerant FTS5 match expression: lowercase, alphanumeric tokens,
/// capped count, each quoted and conjoined with AND. Falls back to quoting
/// the whole input when tokenization leaves nothing.
pub fn fts_match_expr(query: &str) -> String {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(MAX_MATCH_TOKENS)
        .map(|t| format!("\"{t}\""))
        .collect();

    if tokens.is_empty() {
        format!("\"{}\"", query.replace('"', ""))
    } else {
        tokens.join(" AND ")
    }
}

/// Tokens for the LIKE fallback: lowercased, stopword-filtered, length ≥ 3.
pub fn like_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .take(MAX_LIKE_TOKENS)
        .map(String::from)
        .collect()
}

/// Normalize a raw FTS5 rank (negative, lower is better) into (0, 1).
/// Chunks with no usable signal sit at 0.5.
fn bm25_score(rank: f64) -> f64 {
    if rank < 0.0 {
        let relevance = -rank;
        relevance / (1.0 + relevance)
    } else {
        0.5
    }
}

/// Walk the score-descending list capping hits per source; backfill from
/// the skipped remainder if the cap isn't reached.
fn diversify(hits: Vec<ChunkHit>, cap: usize, per_source_limit: usize) -> Vec<ChunkHit> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut chosen: Vec<ChunkHit> = Vec::with_capacity(cap.min(hits.len()));
    let mut skipped: Vec<ChunkHit> = Vec::new();

    for hit in hits {
        if chosen.len() >= cap {
            break;
        }
        let count = per_source.entry(hit.source_id.clone()).or_insert(0);
        if *count < per_source_limit.max(1) {
            *count += 1;
            chosen.push(hit);
        } else {
            skipped.push(hit);
        }
    }

    for hit in skipped {
        if chosen.len() >= cap {
            break;
        }
        chosen.push(hit);
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewChunk, NewSource};

    fn hit(id: &str, source: &str, score: f64) -> ChunkHit {
        ChunkHit {
            id: id.into(),
            source_id: source.into(),
            text: format!("text {id}"),
            score,
            bm25: None,
            snippet: None,
        }
    }

    #[test]
    fn match_expr_quotes_and_conjoins() {
        assert_eq!(
            fts_match_expr("What's NASA Artemis II?"),
            "\"what\" AND \"s\" AND \"nasa\" AND \"artemis\" AND \"ii\""
        );
    }

    #[test]
    fn match_expr_caps_tokens() {
        let long = (0..30).map(|i| format!("tok{i}")).collect::<Vec<_>>().join(" ");
        let expr = fts_match_expr(&long);
        assert_eq!(expr.matches(" AND ").count(), MAX_MATCH_TOKENS - 1);
    }

    #[test]
    fn match_expr_falls_back_to_quoted_input() {
        assert_eq!(fts_match_expr("!!! ???"), "\"!!! ???\"");
    }

    #[test]
    fn like_terms_filter_stopwords_and_short_tokens() {
        let terms = like_terms("What is the Curie point of iron?");
        assert_eq!(terms, vec!["curie", "point", "iron"]);
    }

    #[test]
    fn bm25_normalization_is_monotone() {
        let strong = bm25_score(-5.0);
        let weak = bm25_score(-0.5);
        assert!(strong > weak);
        assert!(strong < 1.0 && weak > 0.0);
        assert_eq!(bm25_score(0.0), 0.5);
    }

    #[test]
    fn diversify_caps_per_source_then_backfills() {
        let hits = vec![
            hit("a1", "s1", 0.9),
            hit("a2", "s1", 0.8),
            hit("a3", "s1", 0.7),
            hit("a4", "s1", 0.6),
            hit("b1", "s2", 0.5),
        ];
        let out = diversify(hits, 5, 3);
        assert_eq!(out.len(), 5);
        // First four slots: three from s1, then s2; the fourth s1 hit
        // backfills at the end.
        let ids: Vec<&str> = out.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3", "b1", "a4"]);
    }

    #[test]
    fn diversify_respects_cap() {
        let hits = (0..10).map(|i| hit(&format!("c{i}"), "s", 0.5)).collect();
        assert_eq!(diversify(hits, 4, 10).len(), 4);
    }

    #[tokio::test]
    async fn ranks_indexed_chunks_best_first() {
        let store = Store::in_memory().await.unwrap();
        let source_id = store
            .insert_source(&NewSource {
                url: "https://example.com/artemis".into(),
                domain: "example.com".into(),
                title: None,
                published_at: None,
                lang: None,
                fingerprint: None,
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunks(&[
                NewChunk {
                    source_id: source_id.clone(),
                    pos: 0,
                    char_start: 0,
                    char_end: 50,
                    text: "NASA announced the Artemis II crewed mission schedule.".into(),
                    tokens: 12,
                },
                NewChunk {
                    source_id: source_id.clone(),
                    pos: 1,
                    char_start: 50,
                    char_end: 90,
                    text: "Unrelated paragraph about gardening tips.".into(),
                    tokens: 8,
                },
            ])
            .await
            .unwrap();

        let ranker = Ranker::new(store);
        let hits = ranker
            .rank_for_queries(
                &["NASA Artemis mission".to_string()],
                &RankOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("Artemis II"));
        assert!(hits[0].score > 0.0 && hits[0].score < 1.0);
    }

    #[tokio::test]
    async fn empty_fts_rebuilds_before_falling_back() {
        let store = Store::in_memory().await.unwrap();
        let source_id = store
            .insert_source(&NewSource {
                url: "https://example.com/page".into(),
                domain: "example.com".into(),
                title: None,
                published_at: None,
                lang: None,
                fingerprint: None,
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunks(&[NewChunk {
                source_id,
                pos: 0,
                char_start: 0,
                char_end: 40,
                text: "superconductors operate at low kelvin".into(),
                tokens: 8,
            }])
            .await
            .unwrap();
        // Drop the index behind the triggers' back.
        sqlx::query("INSERT INTO chunks_fts(chunks_fts) VALUES('delete-all')")
            .execute(store.pool())
            .await
            .unwrap();

        let ranker = Ranker::new(store);
        let hits = ranker
            .rank_for_queries(
                &["superconductors kelvin".to_string()],
                &RankOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "rebuild should restore matches");
    }

    #[tokio::test]
    async fn like_fallback_when_terms_never_match_fts() {
        let store = Store::in_memory().await.unwrap();
        let source_id = store
            .insert_source(&NewSource {
                url: "https://example.com/doc".into(),
                domain: "example.com".into(),
                title: None,
                published_at: None,
                lang: None,
                fingerprint: None,
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunks(&[NewChunk {
                source_id,
                pos: 0,
                char_start: 0,
                char_end: 30,
                text: "microservice authentication".into(),
                tokens: 4,
            }])
            .await
            .unwrap();

        let ranker = Ranker::new(store);
        // FTS on the full phrase won't match (different tokens), the LIKE
        // fallback scans for substrings.
        let hits = ranker
            .rank_for_queries(
                &["authentic zzz".to_string()],
                &RankOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.5);
    }
}
