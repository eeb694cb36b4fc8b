//! `GET /source/{id}` — source metadata with optional content and chunks.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{error_response, internal_error};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuery {
    /// Comma-separated: "content", "chunks".
    #[serde(default)]
    include: Option<String>,
    #[serde(default)]
    chunk_limit: Option<i64>,
    #[serde(default)]
    snippet_chars: Option<usize>,
    #[serde(default)]
    full_content: Option<u8>,
}

pub async fn source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Response {
    let source = match state.store.source_by_id(&id).await {
        Ok(Some(source)) => source,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "source not found"),
        Err(err) => return internal_error(err),
    };

    let include: Vec<&str> = query
        .include
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .collect();

    let mut body = serde_json::json!({ "source": source });

    if include.contains(&"content") {
        match state.store.content_text(&id).await {
            Ok(Some(text)) => {
                let full = query.full_content == Some(1);
                let snippet_chars = query.snippet_chars.unwrap_or(600).clamp(100, 8000);
                let content: String = if full {
                    text
                } else {
                    text.chars().take(snippet_chars).collect()
                };
                body["content"] = serde_json::Value::String(content);
            }
            Ok(None) => {}
            Err(err) => return internal_error(err),
        }
    }

    if include.contains(&"chunks") {
        let limit = query.chunk_limit.unwrap_or(10).clamp(1, 50);
        match state.store.chunks_for_source(&id, limit).await {
            Ok(chunks) => {
                let previews: Vec<serde_json::Value> = chunks
                    .into_iter()
                    .map(|chunk| {
                        let preview: String = chunk.text.chars().take(200).collect();
                        serde_json::json!({
                            "id": chunk.id,
                            "pos": chunk.pos,
                            "charStart": chunk.char_start,
                            "charEnd": chunk.char_end,
                            "tokens": chunk.tokens,
                            "preview": preview,
                        })
                    })
                    .collect();
                body["chunks"] = serde_json::Value::Array(previews);
            }
            Err(err) => return internal_error(err),
        }
    }

    Json(body).into_response()
}
