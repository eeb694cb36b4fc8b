//! Ingestion: canonicalize, dedup, fetch, chunk, persist.
//!
//! Immediate ingestion does the whole read-sanitize-chunk-store path
//! inline; queued ingestion records the URL for the batch worker. Dedup
//! happens twice: on the canonical URL before any fetch, and on the content
//! fingerprint afterwards so mirrors of the same page collapse into one
//! source.

pub mod worker;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::canonical::{canonicalize_url, domain_of};
use crate::error::{ReadError, Result};
use crate::reader::{ReadOptions, Reader};
use crate::store::Store;
use crate::text::{sanitize, split_into_windows, SanitizeOptions, WindowOptions};
use crate::types::{NewChunk, NewSource};

/// Default bound on concurrent inline ingests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Result of ingesting one URL.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Newly ingested.
    Ok { source_id: String },
    /// Canonical URL or identical content already stored.
    Exists { source_id: String },
    /// Recorded in the ingest queue for the batch worker.
    Queued,
    /// Terminal failure for this URL.
    Failed { message: String },
}

impl IngestOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            IngestOutcome::Ok { .. } => "ok",
            IngestOutcome::Exists { .. } => "exists",
            IngestOutcome::Queued => "queued",
            IngestOutcome::Failed { .. } => "error",
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            IngestOutcome::Ok { source_id } | IngestOutcome::Exists { source_id } => {
                Some(source_id)
            }
            _ => None,
        }
    }
}

/// Options for one ingest call.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Fetch and index now, instead of queueing.
    pub immediate: bool,
    /// Queue priority when not immediate.
    pub priority: i64,
    pub read: ReadOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            priority: 0,
            read: ReadOptions::default(),
        }
    }
}

/// The ingestion engine: reader plus store.
#[derive(Clone)]
pub struct Ingestor {
    store: Store,
    reader: Arc<dyn Reader>,
    windows: WindowOptions,
}

impl Ingestor {
    pub fn new(store: Store, reader: Arc<dyn Reader>) -> Self {
        Self {
            store,
            reader,
            windows: WindowOptions::default(),
        }
    }

    /// Override chunk window sizing.
    pub fn with_window_options(mut self, windows: WindowOptions) -> Self {
        self.windows = windows;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Ingest one URL per the options. Never panics; per-URL failures come
    /// back as [`IngestOutcome::Failed`].
    pub async fn ingest(&self, url: &str, opts: &IngestOptions) -> Result<IngestOutcome> {
        let canonical = match canonicalize_url(url) {
            Ok(canonical) => canonical,
            Err(_) => {
                return Ok(IngestOutcome::Failed {
                    message: format!("invalid URL: {url}"),
                })
            }
        };

        if let Some(existing) = self.store.source_by_url(&canonical).await? {
            return Ok(IngestOutcome::Exists {
                source_id: existing.id,
            });
        }

        if !opts.immediate {
            self.store.enqueue_url(&canonical, opts.priority).await?;
            debug!(url = %canonical, priority = opts.priority, "queued for ingestion");
            return Ok(IngestOutcome::Queued);
        }

        self.ingest_now(&canonical, &opts.read).await
    }

    /// The inline path: read, sanitize, dedup on fingerprint, persist
    /// source + content + chunks.
    pub(crate) async fn ingest_now(
        &self,
        canonical: &str,
        read_opts: &ReadOptions,
    ) -> Result<IngestOutcome> {
        if let Some(existing) = self.store.source_by_url(canonical).await? {
            return Ok(IngestOutcome::Exists {
                source_id: existing.id,
            });
        }

        let page = match self.reader.read(canonical, read_opts).await {
            Ok(page) => page,
            Err(ReadError::Cancelled) => return Err(crate::error::ResearchError::Cancelled),
            Err(err) => {
                return Ok(IngestOutcome::Failed {
                    message: err.to_string(),
                })
            }
        };

        let text = sanitize(
            &page.text,
            &SanitizeOptions {
                decode_entities: true,
                collapse_whitespace: true,
                ..Default::default()
            },
        );
        if text.is_empty() {
            return Ok(IngestOutcome::Failed {
                message: format!("no text content at {canonical}"),
            });
        }

        let fingerprint = hex_digest(&text);
        if let Some(existing) = self.store.source_by_fingerprint(&fingerprint).await? {
            return Ok(IngestOutcome::Exists {
                source_id: existing.id,
            });
        }

        let domain = domain_of(canonical).unwrap_or_default();
        let inserted = self
            .store
            .insert_source(&NewSource {
                url: canonical.to_string(),
                domain,
                title: page.title.clone(),
                published_at: None,
                lang: page.lang.clone(),
                fingerprint: Some(fingerprint),
                http_status: page.http_status,
            })
            .await?;

        let Some(source_id) = inserted else {
            // Lost an insert race; the row that won is the source.
            let existing = self.store.source_by_url(canonical).await?;
            return Ok(match existing {
                Some(source) => IngestOutcome::Exists {
                    source_id: source.id,
                },
                None => IngestOutcome::Failed {
                    message: format!("source insert conflicted without a row for {canonical}"),
                },
            });
        };

        self.store
            .insert_content(&source_id, &text, page.html.as_deref())
            .await?;

        let chunks: Vec<NewChunk> = split_into_windows(&text, &self.windows)
            .into_iter()
            .enumerate()
            .map(|(pos, w)| NewChunk {
                source_id: source_id.clone(),
                pos: pos as i64,
                char_start: w.char_start as i64,
                char_end: w.char_end as i64,
                text: w.text,
                tokens: w.approx_tokens as i64,
            })
            .collect();
        let chunk_count = chunks.len();
        self.store.insert_chunks(&chunks).await?;

        info!(url = %canonical, source_id = %source_id, chunks = chunk_count, "ingested");
        Ok(IngestOutcome::Ok { source_id })
    }
}

fn hex_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReader;

    async fn ingestor_with(pages: &[(&str, &str)]) -> Ingestor {
        let store = Store::in_memory().await.unwrap();
        let mut reader = MockReader::new();
        for (url, text) in pages {
            reader = reader.with_page(url, text);
        }
        Ingestor::new(store, Arc::new(reader))
    }

    #[tokio::test]
    async fn ingests_and_chunks_a_page() {
        let ingestor = ingestor_with(&[(
            "https://example.com/a",
            "Some page body with enough text to index.",
        )])
        .await;

        let outcome = ingestor
            .ingest("https://example.com/a", &IngestOptions::default())
            .await
            .unwrap();
        let source_id = outcome.source_id().expect("should create a source").to_string();
        assert_eq!(outcome.status(), "ok");

        let chunks = ingestor.store().chunks_for_source(&source_id, 10).await.unwrap();
        assert_eq!(chunks.len(), 1);
        let content = ingestor.store().content_text(&source_id).await.unwrap().unwrap();
        assert_eq!(
            &content[chunks[0].char_start as usize..chunks[0].char_end as usize],
            chunks[0].text
        );
    }

    #[tokio::test]
    async fn second_ingest_of_same_url_reports_exists() {
        let ingestor = ingestor_with(&[("https://example.com/a", "Body text.")]).await;

        let first = ingestor
            .ingest(
                "HTTPS://Example.COM/a/?utm_source=x&b=2&a=1#frag",
                &IngestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), "ok");

        let second = ingestor
            .ingest("https://example.com/a?a=1&b=2", &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(second.status(), "exists");
        assert_eq!(second.source_id(), first.source_id());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(ingestor.store().pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn identical_content_at_new_url_dedupes_on_fingerprint() {
        let ingestor = ingestor_with(&[
            ("https://example.com/a", "Mirrored body."),
            ("https://mirror.example.org/a", "Mirrored body."),
        ])
        .await;

        let first = ingestor
            .ingest("https://example.com/a", &IngestOptions::default())
            .await
            .unwrap();
        let second = ingestor
            .ingest("https://mirror.example.org/a", &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(second.status(), "exists");
        assert_eq!(second.source_id(), first.source_id());
    }

    #[tokio::test]
    async fn non_immediate_ingest_queues() {
        let ingestor = ingestor_with(&[]).await;
        let outcome = ingestor
            .ingest(
                "https://example.com/later",
                &IngestOptions {
                    immediate: false,
                    priority: 3,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.status(), "queued");
        assert_eq!(ingestor.store().queued_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_page_is_a_per_url_failure() {
        let ingestor = ingestor_with(&[]).await;
        let outcome = ingestor
            .ingest("https://example.com/missing", &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status(), "error");
    }
}
