//! Source, content and chunk persistence, plus chunk retrieval for ranking.

use chrono::Utc;
use sqlx::FromRow;

use super::{parse_timestamp, Store};
use crate::error::Result;
use crate::ids::new_id;
use crate::types::{Chunk, NewChunk, NewSource, Source, SourceStatus};

#[derive(Debug, FromRow)]
struct SourceRow {
    id: String,
    url: String,
    domain: String,
    title: Option<String>,
    published_at: Option<String>,
    crawled_at: Option<String>,
    lang: Option<String>,
    fingerprint: Option<String>,
    status: String,
    http_status: Option<i64>,
    created_at: String,
}

impl SourceRow {
    fn into_source(self) -> Source {
        Source {
            id: self.id,
            url: self.url,
            domain: self.domain,
            title: self.title,
            published_at: self.published_at,
            crawled_at: self.crawled_at.as_deref().map(parse_timestamp),
            lang: self.lang,
            fingerprint: self.fingerprint,
            status: SourceStatus::parse(&self.status),
            http_status: self.http_status.map(|s| s as u16),
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

const SOURCE_COLUMNS: &str = "id, url, domain, title, published_at, crawled_at, lang, \
     fingerprint, status, http_status, created_at";

#[derive(Debug, FromRow)]
struct ChunkRow {
    id: String,
    source_id: String,
    pos: i64,
    char_start: i64,
    char_end: i64,
    text: String,
    tokens: i64,
    created_at: String,
}

impl ChunkRow {
    fn into_chunk(self) -> Chunk {
        Chunk {
            id: self.id,
            source_id: self.source_id,
            pos: self.pos,
            char_start: self.char_start,
            char_end: self.char_end,
            text: self.text,
            tokens: self.tokens,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

/// A raw FTS hit: the chunk plus its rank value.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    /// Raw FTS5 rank; more negative means a better match.
    pub rank: f64,
    pub snippet: Option<String>,
}

impl Store {
    /// Insert a source, idempotent on its canonical URL and fingerprint.
    /// Returns the new id, or `None` when an equivalent row already exists.
    pub async fn insert_source(&self, source: &NewSource) -> Result<Option<String>> {
        let id = new_id();
        let result = sqlx::query(
            r#"
            INSERT INTO sources
                (id, url, domain, title, published_at, crawled_at, lang,
                 fingerprint, status, http_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'ok', ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&source.url)
        .bind(&source.domain)
        .bind(&source.title)
        .bind(&source.published_at)
        .bind(Utc::now().to_rfc3339())
        .bind(&source.lang)
        .bind(&source.fingerprint)
        .bind(source.http_status.map(|s| s as i64))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(id))
    }

    /// Look up a source by canonical URL. Callers canonicalize first.
    pub async fn source_by_url(&self, canonical_url: &str) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE url = ?"
        ))
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceRow::into_source))
    }

    /// Look up a source by content fingerprint.
    pub async fn source_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE fingerprint = ?"
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceRow::into_source))
    }

    pub async fn source_by_id(&self, id: &str) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceRow::into_source))
    }

    /// Store the cleaned text (and optional raw HTML) for a source.
    pub async fn insert_content(
        &self,
        source_id: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_content (source_id, text, html)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(text)
        .bind(html)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The sanitized full text for a source.
    pub async fn content_text(&self, source_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT text FROM source_content WHERE source_id = ?")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(text,)| text))
    }

    /// Bulk insert chunks inside one transaction.
    pub async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(chunks.len());
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let id = new_id();
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, source_id, pos, char_start, char_end, text, tokens, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&chunk.source_id)
            .bind(chunk.pos)
            .bind(chunk.char_start)
            .bind(chunk.char_end)
            .bind(&chunk.text)
            .bind(chunk.tokens)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Chunks of one source in position order.
    pub async fn chunks_for_source(&self, source_id: &str, limit: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT id, source_id, pos, char_start, char_end, text, tokens, created_at
            FROM chunks WHERE source_id = ? ORDER BY pos LIMIT ?
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
    }

    /// Fetch the text of specific chunks, keyed by id.
    pub async fn chunk_texts_by_ids(
        &self,
        ids: &[String],
    ) -> Result<std::collections::HashMap<String, String>> {
        let mut out = std::collections::HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(out);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT id, text FROM chunks WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        for (id, text) in query.fetch_all(&self.pool).await? {
            out.insert(id, text);
        }
        Ok(out)
    }

    /// BM25 search over the FTS index. `match_expr` is a full FTS5 match
    /// expression; results come back best-first.
    pub async fn fts_search(&self, match_expr: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let rows = sqlx::query_as::<_, (String, String, String, f64, String)>(
            r#"
            SELECT c.id, c.source_id, c.text, bm25(chunks_fts) AS rank,
                   snippet(chunks_fts, 0, '', '', '…', 16) AS snip
            FROM chunks_fts
            JOIN chunks c ON c.rowid = chunks_fts.rowid
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk_id, source_id, text, rank, snip)| FtsHit {
                chunk_id,
                source_id,
                text,
                rank,
                snippet: (!snip.is_empty()).then_some(snip),
            })
            .collect())
    }

    /// LIKE-based fallback retrieval over recent sources, for databases
    /// where FTS is unavailable or empty. Terms are ORed; widest chunks
    /// first.
    pub async fn like_search(&self, terms: &[String], limit: i64) -> Result<Vec<FtsHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let clause = terms
            .iter()
            .map(|_| "c.text LIKE ?")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            r#"
            SELECT c.id, c.source_id, c.text
            FROM chunks c
            JOIN sources s ON s.id = c.source_id
            WHERE {clause}
            ORDER BY s.created_at DESC, c.tokens DESC
            LIMIT ?
            "#
        );
        let mut query = sqlx::query_as::<_, (String, String, String)>(&sql);
        for term in terms {
            query = query.bind(format!("%{term}%"));
        }
        query = query.bind(limit);

        Ok(query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(chunk_id, source_id, text)| FtsHit {
                chunk_id,
                source_id,
                text,
                rank: 0.0,
                snippet: None,
            })
            .collect())
    }

    /// Patch mutable source metadata after a re-read.
    pub async fn touch_source(
        &self,
        id: &str,
        title: Option<&str>,
        lang: Option<&str>,
        http_status: Option<u16>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources SET
                title = COALESCE(?, title),
                lang = COALESCE(?, lang),
                http_status = COALESCE(?, http_status),
                crawled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(lang)
        .bind(http_status.map(|s| s as i64))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_source(url: &str, fingerprint: &str) -> NewSource {
        NewSource {
            url: url.into(),
            domain: "example.com".into(),
            title: None,
            published_at: None,
            lang: None,
            fingerprint: Some(fingerprint.into()),
            http_status: Some(200),
        }
    }

    #[tokio::test]
    async fn insert_source_is_idempotent_on_url() {
        let store = Store::in_memory().await.unwrap();
        let first = store
            .insert_source(&new_source("https://example.com/a", "fp1"))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .insert_source(&new_source("https://example.com/a", "fp2"))
            .await
            .unwrap();
        assert!(second.is_none());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn chunk_text_matches_offsets_into_content() {
        let store = Store::in_memory().await.unwrap();
        let full = "First paragraph here.\n\nSecond paragraph follows.";
        let id = store
            .insert_source(&new_source("https://example.com/b", "fp-b"))
            .await
            .unwrap()
            .unwrap();
        store.insert_content(&id, full, None).await.unwrap();

        let windows = crate::text::split_into_windows(full, &Default::default());
        let chunks: Vec<NewChunk> = windows
            .iter()
            .enumerate()
            .map(|(pos, w)| NewChunk {
                source_id: id.clone(),
                pos: pos as i64,
                char_start: w.char_start as i64,
                char_end: w.char_end as i64,
                text: w.text.clone(),
                tokens: w.approx_tokens as i64,
            })
            .collect();
        store.insert_chunks(&chunks).await.unwrap();

        let stored = store.chunks_for_source(&id, 50).await.unwrap();
        let content = store.content_text(&id).await.unwrap().unwrap();
        for chunk in stored {
            assert_eq!(
                &content[chunk.char_start as usize..chunk.char_end as usize],
                chunk.text
            );
        }
    }

    #[tokio::test]
    async fn fts_search_finds_indexed_chunks() {
        let store = Store::in_memory().await.unwrap();
        let id = store
            .insert_source(&new_source("https://example.com/c", "fp-c"))
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunks(&[NewChunk {
                source_id: id.clone(),
                pos: 0,
                char_start: 0,
                char_end: 30,
                text: "the ferromagnetic transition of iron".into(),
                tokens: 8,
            }])
            .await
            .unwrap();

        let hits = store.fts_search("\"ferromagnetic\"", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, id);
        assert!(hits[0].rank < 0.0, "fts5 rank is negative for matches");
    }

    #[tokio::test]
    async fn like_search_matches_terms() {
        let store = Store::in_memory().await.unwrap();
        let id = store
            .insert_source(&new_source("https://example.com/d", "fp-d"))
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunks(&[NewChunk {
                source_id: id.clone(),
                pos: 0,
                char_start: 0,
                char_end: 20,
                text: "lunar lander schedule".into(),
                tokens: 5,
            }])
            .await
            .unwrap();

        let hits = store
            .like_search(&["lander".to_string()], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.like_search(&[], 5).await.unwrap().is_empty());
    }
}
