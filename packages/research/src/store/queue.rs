//! Ingest queue and search audit persistence.

use chrono::{Duration, Utc};
use sqlx::FromRow;

use super::{parse_timestamp, Store};
use crate::error::Result;
use crate::ids::new_id;

/// Lifecycle state of a queued URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Error => "error",
        }
    }
}

/// One row of the durable ingest queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub priority: i64,
    pub attempts: i64,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct QueueRow {
    id: String,
    url: String,
    priority: i64,
    attempts: i64,
    created_at: String,
}

impl QueueRow {
    fn into_item(self) -> QueueItem {
        QueueItem {
            id: self.id,
            url: self.url,
            priority: self.priority,
            attempts: self.attempts,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

impl Store {
    /// Enqueue a URL for background ingestion.
    pub async fn enqueue_url(&self, url: &str, priority: i64) -> Result<String> {
        let id = new_id();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO ingest_queue (id, url, priority, status, attempts, created_at, updated_at)
            VALUES (?, ?, ?, 'queued', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(url)
        .bind(priority)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Move `processing` rows older than `stale_secs` back to `queued`.
    /// Returns how many were revived.
    pub async fn revive_stale(&self, stale_secs: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::seconds(stale_secs)).to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE ingest_queue SET status = 'queued', updated_at = ?
            WHERE status = 'processing' AND updated_at < ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim up to `limit` queued rows inside one transaction, marking them
    /// `processing`. Highest priority first, then fewest attempts, then
    /// oldest.
    pub async fn claim_queue_batch(&self, limit: i64) -> Result<Vec<QueueItem>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT id, url, priority, attempts, created_at
            FROM ingest_queue
            WHERE status = 'queued'
            ORDER BY priority DESC, attempts ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now().to_rfc3339();
        for row in &rows {
            sqlx::query("UPDATE ingest_queue SET status = ?, updated_at = ? WHERE id = ?")
                .bind(QueueStatus::Processing.as_str())
                .bind(&now)
                .bind(&row.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(rows.into_iter().map(QueueRow::into_item).collect())
    }

    /// Mark a claimed row done.
    pub async fn complete_queue_item(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE ingest_queue SET status = ?, error = NULL, updated_at = ? WHERE id = ?")
            .bind(QueueStatus::Done.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failure: requeue while attempts remain, otherwise park the
    /// row as `error`. Returns true when the row was requeued.
    pub async fn fail_queue_item(&self, id: &str, attempts: i64, error: &str, max_attempts: i64) -> Result<bool> {
        let truncated: String = error.chars().take(500).collect();
        let requeue = attempts + 1 < max_attempts;
        let status = if requeue {
            QueueStatus::Queued.as_str()
        } else {
            QueueStatus::Error.as_str()
        };
        sqlx::query(
            "UPDATE ingest_queue SET status = ?, attempts = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(attempts + 1)
        .bind(&truncated)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(requeue)
    }

    /// Number of rows still waiting.
    pub async fn queued_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ingest_queue WHERE status = 'queued'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Audit record of an outbound search.
    pub async fn insert_search_event(
        &self,
        thread_id: Option<&str>,
        query: &str,
        results_json: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_events (id, thread_id, query, results_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(thread_id)
        .bind(query)
        .bind(results_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_orders_by_priority_then_attempts_then_age() {
        let store = Store::in_memory().await.unwrap();
        store.enqueue_url("https://example.com/low", -1).await.unwrap();
        store.enqueue_url("https://example.com/high", 5).await.unwrap();
        store.enqueue_url("https://example.com/mid", 0).await.unwrap();

        let batch = store.claim_queue_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].url, "https://example.com/high");
        assert_eq!(batch[1].url, "https://example.com/mid");

        // Claimed rows are now processing and not claimable again.
        let again = store.claim_queue_batch(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].url, "https://example.com/low");
    }

    #[tokio::test]
    async fn failed_items_requeue_until_attempts_exhaust() {
        let store = Store::in_memory().await.unwrap();
        let id = store.enqueue_url("https://example.com/x", 0).await.unwrap();

        assert!(store.fail_queue_item(&id, 0, "boom", 3).await.unwrap());
        assert!(store.fail_queue_item(&id, 1, "boom", 3).await.unwrap());
        assert!(!store.fail_queue_item(&id, 2, "boom", 3).await.unwrap());

        let (status, attempts): (String, i64) =
            sqlx::query_as("SELECT status, attempts FROM ingest_queue WHERE id = ?")
                .bind(&id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(status, "error");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn stale_processing_rows_are_revived() {
        let store = Store::in_memory().await.unwrap();
        let id = store.enqueue_url("https://example.com/y", 0).await.unwrap();
        store.claim_queue_batch(1).await.unwrap();

        // Backdate the processing mark to look stale.
        sqlx::query("UPDATE ingest_queue SET updated_at = ? WHERE id = ?")
            .bind((Utc::now() - Duration::seconds(600)).to_rfc3339())
            .bind(&id)
            .execute(store.pool())
            .await
            .unwrap();

        assert_eq!(store.revive_stale(300).await.unwrap(), 1);
        assert_eq!(store.queued_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn error_truncation_caps_message_length() {
        let store = Store::in_memory().await.unwrap();
        let id = store.enqueue_url("https://example.com/z", 0).await.unwrap();
        store
            .fail_queue_item(&id, 2, &"e".repeat(2000), 3)
            .await
            .unwrap();
        let (error,): (Option<String>,) =
            sqlx::query_as("SELECT error FROM ingest_queue WHERE id = ?")
                .bind(&id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(error.unwrap().len(), 500);
    }
}
