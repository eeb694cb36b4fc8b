//! Route registration and shared handler plumbing.

mod health;
mod ingest;
mod ingest_job;
mod research;
mod search;
mod source;
mod verify;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/research", post(research::research))
        .route("/search", post(search::search))
        .route("/ingest", post(ingest::ingest))
        .route("/source/{id}", get(source::source))
        .route("/verify", post(verify::verify))
        .route("/ingest-job", get(ingest_job::ingest_job).post(ingest_job::ingest_job))
        .with_state(state)
}

/// Uniform error body for non-streaming endpoints.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// Map a pipeline error onto an HTTP response.
pub(crate) fn internal_error(err: ::research::ResearchError) -> Response {
    tracing::error!(error = %err, "request failed");
    match err {
        ::research::ResearchError::InvalidInput { reason } => {
            error_response(StatusCode::BAD_REQUEST, reason)
        }
        ::research::ResearchError::InvalidUrl { url } => {
            error_response(StatusCode::BAD_REQUEST, format!("invalid URL: {url}"))
        }
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}
