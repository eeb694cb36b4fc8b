//! `POST /search` — direct search with canonicalized results.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use research::search::SearchOptions;
use research::TimeRange;

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    query: String,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    time_range: Option<TimeRange>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    allowed_domains: Vec<String>,
    #[serde(default)]
    disallowed_domains: Vec<String>,
    #[serde(default)]
    thread_id: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Response {
    if body.query.trim().chars().count() < 2 {
        return error_response(StatusCode::BAD_REQUEST, "query must be at least 2 characters");
    }

    let opts = SearchOptions {
        size: body.size.unwrap_or(8).clamp(1, 20),
        time_range: body.time_range,
        region: body.region,
        allowed_domains: body.allowed_domains,
        disallowed_domains: body.disallowed_domains,
        timeout: state.config.pipeline.request_timeout,
        cancel: CancellationToken::new(),
    };

    match state.search.search(&body.query, &opts).await {
        Ok(hits) => {
            let json = serde_json::to_string(&hits).unwrap_or_else(|_| "[]".into());
            if let Err(err) = state
                .store
                .insert_search_event(body.thread_id.as_deref(), &body.query, &json)
                .await
            {
                tracing::warn!(error = %err, "failed to record search event");
            }
            Json(hits).into_response()
        }
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}
