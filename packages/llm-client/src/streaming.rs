//! SSE decoding for streaming chat completions.
//!
//! Adapts a raw `reqwest` byte stream into text deltas. Handles `data:`
//! lines split across network chunks and the `[DONE]` sentinel.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::LlmError;

/// One delta from a streaming completion.
#[derive(Debug, Clone)]
pub struct CompletionDelta {
    /// Text fragment for this chunk (may be empty).
    pub text: String,
    /// Set once the provider signals end of stream.
    pub done: bool,
}

#[derive(Debug, serde::Deserialize)]
struct RawChunk {
    choices: Vec<RawChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct RawChoice {
    delta: RawDelta,
}

#[derive(Debug, serde::Deserialize)]
struct RawDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Stream adapter turning provider SSE bytes into [`CompletionDelta`]s.
pub struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    finished: bool,
}

impl CompletionStream {
    pub(crate) fn new(
        bytes: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(bytes),
            buffer: String::new(),
            finished: false,
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<CompletionDelta, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            if let Some(item) = next_delta(&mut this.buffer) {
                if let Ok(delta) = &item {
                    this.finished = delta.done;
                }
                return Poll::Ready(Some(item));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => this.buffer.push_str(text),
                    Err(e) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(LlmError::Parse(format!(
                            "invalid UTF-8 in stream: {e}"
                        )))));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(LlmError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    // Drain whatever a final unterminated line holds.
                    if !this.buffer.ends_with('\n') && !this.buffer.trim().is_empty() {
                        this.buffer.push('\n');
                        if let Some(item) = next_delta(&mut this.buffer) {
                            return Poll::Ready(Some(item));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pop the next complete `data:` line from the buffer and decode it.
/// Returns `None` while no full line is buffered.
fn next_delta(buffer: &mut String) -> Option<Result<CompletionDelta, LlmError>> {
    loop {
        let newline = buffer.find('\n')?;
        let line = buffer[..newline].trim().to_string();
        buffer.drain(..=newline);

        if line.is_empty() {
            continue;
        }

        let Some(data) = line.strip_prefix("data:") else {
            // event:/id:/retry: lines carry nothing for completions
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(Ok(CompletionDelta {
                text: String::new(),
                done: true,
            }));
        }

        return Some(match serde_json::from_str::<RawChunk>(data) {
            Ok(raw) => {
                let text = raw
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                Ok(CompletionDelta { text, done: false })
            }
            Err(e) => Err(LlmError::Parse(format!(
                "bad stream chunk: {e} (data: {})",
                &data[..data.len().min(200)]
            ))),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sse(lines: &[&str]) -> Vec<Result<Bytes, reqwest::Error>> {
        lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect()
    }

    #[tokio::test]
    async fn decodes_deltas_in_order() {
        let chunks = sse(&[
            r#"data: {"choices":[{"delta":{"content":"The"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":" answer"}}]}"#,
            "",
            "data: [DONE]",
        ]);
        let mut stream = CompletionStream::new(futures::stream::iter(chunks));

        assert_eq!(stream.next().await.unwrap().unwrap().text, "The");
        assert_eq!(stream.next().await.unwrap().unwrap().text, " answer");
        assert!(stream.next().await.unwrap().unwrap().done);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn tolerates_chunk_boundary_inside_line() {
        let parts: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from(r#"data: {"choices":[{"del"#)),
            Ok(Bytes::from("ta\":{\"content\":\"hi\"}}]}\n")),
            Ok(Bytes::from("data: [DONE]\n")),
        ];
        let mut stream = CompletionStream::new(futures::stream::iter(parts));

        assert_eq!(stream.next().await.unwrap().unwrap().text, "hi");
        assert!(stream.next().await.unwrap().unwrap().done);
    }

    #[tokio::test]
    async fn empty_delta_is_empty_string() {
        let chunks = sse(&[r#"data: {"choices":[{"delta":{}}]}"#, "data: [DONE]"]);
        let mut stream = CompletionStream::new(futures::stream::iter(chunks));
        assert_eq!(stream.next().await.unwrap().unwrap().text, "");
    }

    #[tokio::test]
    async fn ignores_non_data_fields() {
        let chunks = sse(&[
            "event: message",
            ": heartbeat",
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            "data: [DONE]",
        ]);
        let mut stream = CompletionStream::new(futures::stream::iter(chunks));
        assert_eq!(stream.next().await.unwrap().unwrap().text, "x");
    }
}
