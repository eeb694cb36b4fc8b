//! Threads, messages and citations.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One research run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub visitor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}

/// A message within a thread, ordered by `created_at`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content_md: String,
    pub created_at: DateTime<Utc>,
}

/// A source reference attached to an assistant message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    pub message_id: String,
    pub source_id: String,
    pub chunk_id: Option<String>,
    pub quote: String,
    pub char_start: Option<i64>,
    pub char_end: Option<i64>,
    pub rank_score: Option<f64>,
}
