//! Sources, content and chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Ok,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "ok",
            SourceStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "error" => SourceStatus::Error,
            _ => SourceStatus::Ok,
        }
    }
}

/// A fetched, deduplicated web page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    /// Canonical URL, unique per source.
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub lang: Option<String>,
    /// SHA-256 hex digest of the sanitized text.
    pub fingerprint: Option<String>,
    pub status: SourceStatus,
    pub http_status: Option<u16>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub lang: Option<String>,
    pub fingerprint: Option<String>,
    pub http_status: Option<u16>,
}

/// A contiguous span of a source's sanitized text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    /// 0-based position within the source.
    pub pos: i64,
    pub char_start: i64,
    pub char_end: i64,
    pub text: String,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new chunk.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_id: String,
    pub pos: i64,
    pub char_start: i64,
    pub char_end: i64,
    pub text: String,
    pub tokens: i64,
}

/// A ranked chunk returned by the ranker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHit {
    pub id: String,
    pub source_id: String,
    pub text: String,
    /// Fused relevance score in (0, 1].
    pub score: f64,
    /// Raw BM25 score when the hit came from FTS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Compact source reference for the `sources` stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// 1-based citation index used by `[n]` markers in the answer.
    pub index: usize,
}
