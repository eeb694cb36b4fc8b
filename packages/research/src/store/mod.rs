//! Durable storage on SQLite.
//!
//! One pool, inline migrations, and an FTS5 external-content index over
//! chunk text kept in sync by triggers. The FTS table is a derived view:
//! `rebuild_fts` re-derives it from `chunks` whenever it drifts (or when a
//! migration path never populated it).

mod claims;
mod queue;
mod sources;
mod threads;

pub use queue::{QueueItem, QueueStatus};
pub use sources::FtsHit;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    visitor_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content_md TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, created_at);

CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    title TEXT,
    published_at TEXT,
    crawled_at TEXT,
    lang TEXT,
    fingerprint TEXT,
    status TEXT NOT NULL DEFAULT 'ok',
    http_status INTEGER,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sources_url ON sources(url);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sources_fingerprint
    ON sources(fingerprint) WHERE fingerprint IS NOT NULL;

CREATE TABLE IF NOT EXISTS source_content (
    source_id TEXT PRIMARY KEY REFERENCES sources(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    html TEXT
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    pos INTEGER NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    text TEXT NOT NULL,
    tokens INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_source_pos ON chunks(source_id, pos);

CREATE TABLE IF NOT EXISTS citations (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    source_id TEXT NOT NULL,
    chunk_id TEXT,
    quote TEXT NOT NULL,
    char_start INTEGER,
    char_end INTEGER,
    rank_score REAL
);
CREATE INDEX IF NOT EXISTS idx_citations_message ON citations(message_id);

CREATE TABLE IF NOT EXISTS claims (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    claim_type TEXT,
    support_score REAL NOT NULL DEFAULT 0
        CHECK (support_score >= 0 AND support_score <= 1),
    contradicted INTEGER NOT NULL DEFAULT 0,
    uncertainty_reason TEXT
);

CREATE TABLE IF NOT EXISTS claim_evidence (
    id TEXT PRIMARY KEY,
    claim_id TEXT NOT NULL REFERENCES claims(id) ON DELETE CASCADE,
    source_id TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    quote TEXT NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    score REAL
);
CREATE INDEX IF NOT EXISTS idx_claim_evidence_claim ON claim_evidence(claim_id);

CREATE TABLE IF NOT EXISTS ingest_queue (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'queued',
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ingest_queue_status ON ingest_queue(status);

CREATE TABLE IF NOT EXISTS search_events (
    id TEXT PRIMARY KEY,
    thread_id TEXT,
    query TEXT NOT NULL,
    results_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    content='chunks',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.rowid, old.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;
"#;

/// Handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) and migrate a database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database for tests. Single connection: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        sqlx::raw_sql(FTS_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of rows currently indexed in `chunks_fts`.
    pub async fn fts_row_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks_fts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Re-derive the FTS index from the `chunks` table. Used both as an
    /// operator tool and as the backfill path when ranking finds the index
    /// empty while chunks exist.
    pub async fn rebuild_fts(&self) -> Result<()> {
        sqlx::query("INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Verify the FTS mirror matches `chunks` row-for-row.
    pub async fn fts_consistent(&self) -> Result<bool> {
        let (chunks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let fts = self.fts_row_count().await?;
        if chunks != fts {
            return Ok(false);
        }
        let (mismatched,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM chunks c LEFT JOIN chunks_fts f ON f.rowid = c.rowid
            WHERE f.text IS NULL OR f.text != c.text
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(mismatched == 0)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use crate::types::{NewChunk, NewSource};

    async fn seeded_store() -> (Store, String) {
        let store = Store::in_memory().await.unwrap();
        let source_id = store
            .insert_source(&NewSource {
                url: "https://example.com/a".into(),
                domain: "example.com".into(),
                title: Some("A".into()),
                published_at: None,
                lang: None,
                fingerprint: Some("fp-a".into()),
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        store
            .insert_content(&source_id, "alpha beta gamma", None)
            .await
            .unwrap();
        store
            .insert_chunks(&[NewChunk {
                source_id: source_id.clone(),
                pos: 0,
                char_start: 0,
                char_end: 16,
                text: "alpha beta gamma".into(),
                tokens: 4,
            }])
            .await
            .unwrap();
        (store, source_id)
    }

    #[tokio::test]
    async fn fts_stays_consistent_under_insert_and_delete() {
        let (store, source_id) = seeded_store().await;
        assert!(store.fts_consistent().await.unwrap());
        assert_eq!(store.fts_row_count().await.unwrap(), 1);

        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(&source_id)
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.fts_row_count().await.unwrap(), 0);
        assert!(store.fts_consistent().await.unwrap());
    }

    #[tokio::test]
    async fn fts_update_trigger_keeps_index_in_sync() {
        let (store, source_id) = seeded_store().await;
        sqlx::query("UPDATE chunks SET text = 'delta epsilon' WHERE source_id = ?")
            .bind(&source_id)
            .execute(store.pool())
            .await
            .unwrap();
        assert!(store.fts_consistent().await.unwrap());

        let hits = store.fts_search("\"delta\"", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let stale = store.fts_search("\"alpha\"", 10).await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn rebuild_restores_a_dropped_index() {
        let (store, _) = seeded_store().await;
        // Wipe the shadow index behind the triggers' back.
        sqlx::query("INSERT INTO chunks_fts(chunks_fts) VALUES('delete-all')")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.fts_row_count().await.unwrap(), 0);

        store.rebuild_fts().await.unwrap();
        assert_eq!(store.fts_row_count().await.unwrap(), 1);
        assert!(store.fts_consistent().await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_message_cascades_claims_and_evidence() {
        let (store, source_id) = seeded_store().await;
        let thread = store.insert_thread("t", None).await.unwrap();
        let message = store
            .insert_message(&thread.id, crate::types::Role::Assistant, "answer")
            .await
            .unwrap();
        let claim = store
            .insert_claim(&message.id, "claim text", None, 0.9, false, None)
            .await
            .unwrap();
        let chunk = store
            .chunks_for_source(&source_id, 10)
            .await
            .unwrap()
            .remove(0);
        store
            .insert_claim_evidence(&claim.id, &source_id, &chunk.id, "alpha", 0, 5, None)
            .await
            .unwrap();

        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(&message.id)
            .execute(store.pool())
            .await
            .unwrap();

        let (claims,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM claims")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let (evidence,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM claim_evidence")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!((claims, evidence), (0, 0));
    }

    #[tokio::test]
    async fn support_score_outside_unit_interval_is_rejected() {
        let (store, _) = seeded_store().await;
        let thread = store.insert_thread("t", None).await.unwrap();
        let message = store
            .insert_message(&thread.id, crate::types::Role::Assistant, "a")
            .await
            .unwrap();
        let result = sqlx::query(
            "INSERT INTO claims (id, message_id, text, support_score, contradicted) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(new_id())
        .bind(&message.id)
        .bind("bad")
        .bind(1.5_f64)
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }
}
