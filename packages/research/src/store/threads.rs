//! Thread, message and citation persistence.

use chrono::Utc;

use super::Store;
use crate::error::Result;
use crate::ids::new_id;
use crate::types::{Citation, Message, Role, Thread};

impl Store {
    /// Create a thread for a research run.
    pub async fn insert_thread(&self, title: &str, visitor_id: Option<&str>) -> Result<Thread> {
        let thread = Thread {
            id: new_id(),
            title: title.to_string(),
            visitor_id: visitor_id.map(String::from),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO threads (id, title, visitor_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(&thread.id)
            .bind(&thread.title)
            .bind(&thread.visitor_id)
            .bind(thread.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(thread)
    }

    /// Append a message to a thread.
    pub async fn insert_message(
        &self,
        thread_id: &str,
        role: Role,
        content_md: &str,
    ) -> Result<Message> {
        let message = Message {
            id: new_id(),
            thread_id: thread_id.to_string(),
            role,
            content_md: content_md.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO messages (id, thread_id, role, content_md, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.thread_id)
        .bind(message.role.as_str())
        .bind(&message.content_md)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(message)
    }

    /// Attach a citation to an assistant message.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_citation(
        &self,
        message_id: &str,
        source_id: &str,
        chunk_id: Option<&str>,
        quote: &str,
        char_start: Option<i64>,
        char_end: Option<i64>,
        rank_score: Option<f64>,
    ) -> Result<Citation> {
        let citation = Citation {
            id: new_id(),
            message_id: message_id.to_string(),
            source_id: source_id.to_string(),
            chunk_id: chunk_id.map(String::from),
            quote: quote.to_string(),
            char_start,
            char_end,
            rank_score,
        };
        sqlx::query(
            r#"
            INSERT INTO citations
                (id, message_id, source_id, chunk_id, quote, char_start, char_end, rank_score)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&citation.id)
        .bind(&citation.message_id)
        .bind(&citation.source_id)
        .bind(&citation.chunk_id)
        .bind(&citation.quote)
        .bind(citation.char_start)
        .bind(citation.char_end)
        .bind(citation.rank_score)
        .execute(&self.pool)
        .await?;
        Ok(citation)
    }
}
