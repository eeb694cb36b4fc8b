//! `POST /verify` — standalone claim extraction over caller snippets.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use research::prompts::VerifySnippet;
use research::verify::{verify as run_verify, VerifyOptions};

use super::{error_response, internal_error};
use crate::state::AppState;

fn default_bind_offsets() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    answer_markdown: String,
    snippets: Vec<SnippetBody>,
    #[serde(default)]
    max_claims: Option<usize>,
    #[serde(default = "default_bind_offsets")]
    bind_offsets: bool,
    #[serde(default)]
    nli_contradiction_check: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetBody {
    source_id: String,
    #[serde(default)]
    chunk_id: Option<String>,
    text: String,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyBody>,
) -> Response {
    if body.answer_markdown.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "answerMarkdown must not be empty");
    }
    if body.snippets.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "snippets must not be empty");
    }

    let snippets: Vec<VerifySnippet> = body
        .snippets
        .into_iter()
        .map(|s| VerifySnippet {
            source_id: s.source_id,
            chunk_id: s.chunk_id,
            text: s.text,
        })
        .collect();

    let chunk_ids: Vec<String> = snippets
        .iter()
        .filter_map(|s| s.chunk_id.clone())
        .collect();
    let chunk_texts = match state.store.chunk_texts_by_ids(&chunk_ids).await {
        Ok(map) => map,
        Err(err) => return internal_error(err),
    };

    let opts = VerifyOptions {
        max_claims: body.max_claims.unwrap_or(12).clamp(1, 50),
        bind_offsets: body.bind_offsets,
        nli_contradiction_check: body.nli_contradiction_check,
        cancel: CancellationToken::new(),
        ..Default::default()
    };

    match run_verify(
        state.llm.as_ref(),
        &body.answer_markdown,
        &snippets,
        &chunk_texts,
        &opts,
    )
    .await
    {
        Ok(claims) => Json(serde_json::json!({ "claims": claims })).into_response(),
        Err(err) => internal_error(err),
    }
}
