//! `POST /ingest` — ingest a batch of URLs, inline or queued.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use research::ingest::{IngestOptions, DEFAULT_CONCURRENCY};
use research::reader::ReadOptions;
use research::util::map_limit;

use super::error_response;
use crate::state::AppState;

fn default_immediate() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBody {
    urls: Vec<String>,
    #[serde(default = "default_immediate")]
    immediate: bool,
    #[serde(default)]
    priority: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UrlResult {
    url: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestBody>,
) -> Response {
    if body.urls.is_empty() || body.urls.len() > 32 {
        return error_response(StatusCode::BAD_REQUEST, "urls must contain 1..32 entries");
    }
    if !(-10..=10).contains(&body.priority) {
        return error_response(StatusCode::BAD_REQUEST, "priority must be in [-10, 10]");
    }

    let opts = IngestOptions {
        immediate: body.immediate,
        priority: body.priority,
        read: ReadOptions {
            timeout: state.config.pipeline.request_timeout,
            prefer: state.config.pipeline.reader_prefer,
            cancel: CancellationToken::new(),
            ..Default::default()
        },
    };

    let outcomes = map_limit(body.urls, DEFAULT_CONCURRENCY, |url| {
        let ingestor = state.ingestor.clone();
        let opts = opts.clone();
        async move {
            let outcome = ingestor.ingest(&url, &opts).await;
            (url, outcome)
        }
    })
    .await;

    let mut results = Vec::with_capacity(outcomes.len());
    let mut source_ids = Vec::new();
    for (url, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                if let Some(id) = outcome.source_id() {
                    source_ids.push(id.to_string());
                }
                let message = match &outcome {
                    research::ingest::IngestOutcome::Failed { message } => {
                        Some(message.clone())
                    }
                    _ => None,
                };
                results.push(UrlResult {
                    url,
                    status: outcome.status(),
                    source_id: outcome.source_id().map(String::from),
                    message,
                });
            }
            Err(err) => results.push(UrlResult {
                url,
                status: "error",
                source_id: None,
                message: Some(err.to_string()),
            }),
        }
    }

    Json(serde_json::json!({ "results": results, "sourceIds": source_ids })).into_response()
}
