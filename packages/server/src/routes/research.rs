//! `POST /research` — the streaming research run.
//!
//! The response is an SSE byte stream fed by a capacity-1 channel; the
//! orchestrator's event channel is forwarded frame by frame, so at most
//! one LLM delta is ever buffered. Closing the connection cancels the run.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use research::protocol::{spawn_heartbeat, SseWriter, HEARTBEAT_INTERVAL};
use research::ResearchRequest;

use crate::state::AppState;

pub async fn research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResearchRequest>,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    if let Err(err) = request.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        ));
    }

    let (writer, byte_rx) = SseWriter::channel();
    let cancel = CancellationToken::new();
    let _heartbeat = spawn_heartbeat(writer.clone(), HEARTBEAT_INTERVAL, cancel.clone());

    // Orchestrator events → SSE frames. A failed send means the client
    // disconnected, which cancels the run.
    let (events_tx, mut events_rx) = mpsc::channel(1);
    tokio::spawn({
        let writer = writer.clone();
        let cancel = cancel.clone();
        async move {
            while let Some(event) = events_rx.recv().await {
                let frame = research::ResearchEvent::to_frame(&event);
                if !writer.send(&frame).await {
                    cancel.cancel();
                    break;
                }
            }
            // Run finished (or died): stop heartbeats, end the stream.
            cancel.cancel();
            writer.close("stream complete").await;
        }
    });

    let orchestrator = state.orchestrator.clone();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            orchestrator.run(request, cancel, events_tx).await;
        }
    });

    let body = Body::from_stream(byte_rx.map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })
}
