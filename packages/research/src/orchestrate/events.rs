//! Events emitted over a research run's stream.

use serde::Serialize;
use serde_json::Value;

use crate::protocol::SseFrame;
use crate::types::{SourceRef, VerifiedClaim};

/// Pipeline stages in execution order. The ordering is load-bearing:
/// progress events must never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Search,
    Read,
    Rank,
    Answer,
    Verify,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Search => "search",
            Stage::Read => "read",
            Stage::Rank => "rank",
            Stage::Answer => "answer",
            Stage::Verify => "verify",
            Stage::Done => "done",
        }
    }
}

/// One event in a research run's stream.
#[derive(Debug, Clone)]
pub enum ResearchEvent {
    Progress {
        stage: Stage,
        message: Option<String>,
        meta: Option<Value>,
    },
    Sources(Vec<SourceRef>),
    /// Raw text delta; not JSON on the wire.
    Token(String),
    /// The complete answer, after streaming finishes.
    Answer { text: String },
    Claims { claims: Vec<VerifiedClaim> },
    Error { message: String },
    Done { thread_id: String },
}

#[derive(Serialize)]
struct ProgressPayload<'a> {
    stage: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: &'a Option<Value>,
}

impl ResearchEvent {
    /// Shorthand for a progress event.
    pub fn progress(stage: Stage, message: impl Into<String>) -> Self {
        ResearchEvent::Progress {
            stage,
            message: Some(message.into()),
            meta: None,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ResearchEvent::Progress { .. } => "progress",
            ResearchEvent::Sources(_) => "sources",
            ResearchEvent::Token(_) => "token",
            ResearchEvent::Answer { .. } => "answer",
            ResearchEvent::Claims { .. } => "claims",
            ResearchEvent::Error { .. } => "error",
            ResearchEvent::Done { .. } => "done",
        }
    }

    /// Encode for the wire. Every payload is JSON except `token`, which is
    /// the raw delta string.
    pub fn to_frame(&self) -> SseFrame {
        let json = |value: Result<String, serde_json::Error>| {
            SseFrame::named(self.name(), value.unwrap_or_else(|_| "{}".to_string()))
        };
        match self {
            ResearchEvent::Token(delta) => SseFrame::named("token", delta.clone()),
            ResearchEvent::Progress { stage, message, meta } => {
                json(serde_json::to_string(&ProgressPayload {
                    stage: stage.as_str(),
                    message,
                    meta,
                }))
            }
            ResearchEvent::Sources(sources) => json(serde_json::to_string(sources)),
            ResearchEvent::Answer { text } => {
                json(serde_json::to_string(&serde_json::json!({ "text": text })))
            }
            ResearchEvent::Claims { claims } => {
                json(serde_json::to_string(&serde_json::json!({ "claims": claims })))
            }
            ResearchEvent::Error { message } => {
                json(serde_json::to_string(&serde_json::json!({ "message": message })))
            }
            ResearchEvent::Done { thread_id } => {
                json(serde_json::to_string(&serde_json::json!({ "threadId": thread_id })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_monotone() {
        assert!(Stage::Plan < Stage::Search);
        assert!(Stage::Search < Stage::Read);
        assert!(Stage::Read < Stage::Rank);
        assert!(Stage::Rank < Stage::Answer);
        assert!(Stage::Answer < Stage::Verify);
        assert!(Stage::Verify < Stage::Done);
    }

    #[test]
    fn token_frames_are_raw() {
        let frame = ResearchEvent::Token("not {json}".into()).to_frame();
        assert_eq!(frame.event.as_deref(), Some("token"));
        assert_eq!(frame.data, "not {json}");
    }

    #[test]
    fn progress_frames_are_json() {
        let frame = ResearchEvent::progress(Stage::Search, "Found 3 unique URLs").to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(value["stage"], "search");
        assert_eq!(value["message"], "Found 3 unique URLs");
    }

    #[test]
    fn done_frame_carries_thread_id() {
        let frame = ResearchEvent::Done { thread_id: "01ABC".into() }.to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(value["threadId"], "01ABC");
    }
}
