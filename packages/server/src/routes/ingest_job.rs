//! `GET|POST /ingest-job` — run one batch of the durable ingest queue.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use research::ingest::worker::{run_batch, WorkerOptions};
use research::reader::ReadOptions;

use super::internal_error;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    revive_stale_sec: Option<i64>,
    #[serde(default)]
    dry_run: Option<u8>,
}

pub async fn ingest_job(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> Response {
    let opts = WorkerOptions {
        limit: query.limit.unwrap_or(10).clamp(1, 50),
        concurrency: query.concurrency.unwrap_or(4).clamp(1, 8),
        revive_stale_secs: query.revive_stale_sec.unwrap_or(300).clamp(60, 3600),
        dry_run: query.dry_run == Some(1),
        read: ReadOptions {
            timeout: state.config.pipeline.request_timeout,
            prefer: state.config.pipeline.reader_prefer,
            cancel: CancellationToken::new(),
            ..Default::default()
        },
        ..Default::default()
    };

    match run_batch(&state.ingestor, &opts).await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => internal_error(err),
    }
}
