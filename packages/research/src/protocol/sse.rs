//! SSE wire handling.
//!
//! The writer is a bounded byte channel (capacity 1): a send parks until
//! the consumer drains the previous frame, so at most one LLM delta is
//! buffered. Heartbeat comments keep proxies from closing idle streams.
//! The decoder accumulates lines across arbitrary chunk boundaries.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Heartbeat cadence for open streams.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
/// Client-side bound on time to first response headers.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);
/// Client-side bound on silence between events.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// One outbound SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    /// A named event with a data payload.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Default::default()
        }
    }

    /// A named event carrying a JSON payload.
    pub fn json<T: serde::Serialize>(
        event: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::named(event, serde_json::to_string(payload)?))
    }
}

/// Encode a frame as an SSE block. Newlines in `data` become multiple
/// `data:` lines; a blank line terminates the event.
pub fn encode_frame(frame: &SseFrame) -> String {
    let mut out = String::new();
    if let Some(event) = &frame.event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    if let Some(id) = &frame.id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    if let Some(retry) = frame.retry {
        out.push_str(&format!("retry: {retry}\n"));
    }
    for line in frame.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Encode a comment line (used for heartbeats).
pub fn encode_comment(text: &str) -> String {
    format!(": {text}\n\n")
}

/// Writing half of an SSE response.
#[derive(Clone)]
pub struct SseWriter {
    tx: mpsc::Sender<Bytes>,
}

impl SseWriter {
    /// Create a writer and the byte stream to hand to the HTTP response.
    /// Capacity 1: the producer waits for the consumer.
    pub fn channel() -> (Self, ReceiverStream<Bytes>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Send a frame. Returns false once the client is gone.
    pub async fn send(&self, frame: &SseFrame) -> bool {
        self.tx
            .send(Bytes::from(encode_frame(frame)))
            .await
            .is_ok()
    }

    /// Send a comment line.
    pub async fn comment(&self, text: &str) -> bool {
        self.tx
            .send(Bytes::from(encode_comment(text)))
            .await
            .is_ok()
    }

    /// Heartbeat comment.
    pub async fn ping(&self) -> bool {
        self.comment("ping").await
    }

    /// Send a closing comment and drop this handle. The stream ends when
    /// the last writer clone is dropped.
    pub async fn close(self, reason: &str) {
        let _ = self.comment(reason).await;
    }
}

/// Periodic heartbeats until cancelled or the client disconnects.
pub fn spawn_heartbeat(
    writer: SseWriter,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick carries no heartbeat
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !writer.ping().await {
                        break;
                    }
                }
            }
        }
    })
}

/// One decoded SSE message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
    pub comments: Vec<String>,
}

impl SseMessage {
    fn is_empty(&self) -> bool {
        self.event.is_none()
            && self.data.is_empty()
            && self.id.is_none()
            && self.retry.is_none()
            && self.comments.is_empty()
    }
}

/// Line-accumulating decoder, robust to chunk boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk; returns every message completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseMessage> {
        self.buffer.push_str(chunk);
        // Normalizing late keeps a \r\n split across chunks intact.
        let normalized = self.buffer.replace("\r\n", "\n");
        self.buffer = normalized;

        let mut messages = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let block: String = self.buffer[..boundary].to_string();
            self.buffer.drain(..boundary + 2);
            let message = parse_block(&block);
            if !message.is_empty() {
                messages.push(message);
            }
        }
        messages
    }

    /// Flush a trailing unterminated block at end of stream.
    pub fn finish(&mut self) -> Option<SseMessage> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return None;
        }
        let message = parse_block(&rest);
        (!message.is_empty()).then_some(message)
    }
}

fn parse_block(block: &str) -> SseMessage {
    let mut message = SseMessage::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.split('\n') {
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix(':') {
            message.comments.push(comment.trim_start().to_string());
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => message.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "id" => message.id = Some(value.to_string()),
            "retry" => message.retry = value.parse().ok(),
            _ => {} // unknown fields are ignored
        }
    }

    message.data = data_lines.join("\n");
    message
}

/// Client-side liveness tracking: time to first headers vs. silence since
/// the last event. Pure so both bounds are testable without a network.
#[derive(Debug)]
pub struct Watchdog {
    started: Instant,
    connected: Option<Instant>,
    last_event: Option<Instant>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

/// Which bound a watchdog tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExpiry {
    Connect,
    Idle,
}

impl Watchdog {
    pub fn new(started: Instant, connect_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            started,
            connected: None,
            last_event: None,
            connect_timeout,
            idle_timeout,
        }
    }

    /// Response headers arrived.
    pub fn on_connected(&mut self, now: Instant) {
        self.connected = Some(now);
        self.last_event = Some(now);
    }

    /// An event (or heartbeat) arrived.
    pub fn on_event(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    /// Check both bounds.
    pub fn expired(&self, now: Instant) -> Option<WatchdogExpiry> {
        match self.connected {
            None => (now.duration_since(self.started) >= self.connect_timeout)
                .then_some(WatchdogExpiry::Connect),
            Some(_) => {
                let last = self.last_event.unwrap_or(self.started);
                (now.duration_since(last) >= self.idle_timeout).then_some(WatchdogExpiry::Idle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_json() {
        let payload = serde_json::json!({"stage": "search", "message": "Found 3 unique URLs"});
        let frame = SseFrame::json("progress", &payload).unwrap();
        let wire = encode_frame(&frame);

        let mut decoder = SseDecoder::new();
        let messages = decoder.push(&wire);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("progress"));
        let decoded: serde_json::Value = serde_json::from_str(&messages[0].data).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn multiline_data_splits_and_rejoins() {
        let frame = SseFrame::named("answer", "line one\nline two\nline three");
        let wire = encode_frame(&frame);
        assert_eq!(wire.matches("data: ").count(), 3);

        let mut decoder = SseDecoder::new();
        let messages = decoder.push(&wire);
        assert_eq!(messages[0].data, "line one\nline two\nline three");
    }

    #[test]
    fn decoder_survives_chunk_boundaries() {
        let wire = encode_frame(&SseFrame::named("token", "hello world"));
        let mut decoder = SseDecoder::new();

        let mid = wire.len() / 2;
        assert!(decoder.push(&wire[..mid]).is_empty());
        let messages = decoder.push(&wire[mid..]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "hello world");
    }

    #[test]
    fn decoder_normalizes_crlf() {
        let wire = "event: done\r\ndata: {\"threadId\":\"t1\"}\r\n\r\n";
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(wire);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("done"));
    }

    #[test]
    fn crlf_split_across_chunks_still_decodes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("data: x\r").is_empty());
        let messages = decoder.push("\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "x");
    }

    #[test]
    fn comments_and_unknown_fields() {
        let wire = ": heartbeat\nwhatever: ignored\ndata: payload\nid: 7\nretry: 2500\n\n";
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(wire);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].comments, vec!["heartbeat"]);
        assert_eq!(messages[0].data, "payload");
        assert_eq!(messages[0].id.as_deref(), Some("7"));
        assert_eq!(messages[0].retry, Some(2500));
    }

    #[test]
    fn finish_flushes_trailing_block() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push("data: tail").is_empty());
        let message = decoder.finish().unwrap();
        assert_eq!(message.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn writer_blocks_on_full_channel() {
        let (writer, mut rx) = SseWriter::channel();
        assert!(writer.send(&SseFrame::named("token", "a")).await);

        // Second send parks until the consumer drains.
        let send = tokio::spawn({
            let writer = writer.clone();
            async move { writer.send(&SseFrame::named("token", "b")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send.is_finished(), "send should wait for the consumer");

        use tokio_stream::StreamExt;
        rx.next().await;
        assert!(send.await.unwrap());
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (writer, rx) = SseWriter::channel();
        drop(rx);
        assert!(!writer.send(&SseFrame::named("token", "x")).await);
    }

    #[tokio::test]
    async fn heartbeat_emits_comments() {
        let (writer, mut rx) = SseWriter::channel();
        let cancel = CancellationToken::new();
        let handle = spawn_heartbeat(writer, Duration::from_millis(10), cancel.clone());

        use tokio_stream::StreamExt;
        let first = rx.next().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().starts_with(": ping"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn watchdog_distinguishes_connect_from_idle() {
        let start = Instant::now();
        let mut watchdog = Watchdog::new(start, Duration::from_secs(45), Duration::from_secs(60));

        assert!(watchdog.expired(start + Duration::from_secs(44)).is_none());
        assert_eq!(
            watchdog.expired(start + Duration::from_secs(45)),
            Some(WatchdogExpiry::Connect)
        );

        watchdog.on_connected(start + Duration::from_secs(10));
        assert!(watchdog.expired(start + Duration::from_secs(69)).is_none());
        assert_eq!(
            watchdog.expired(start + Duration::from_secs(70)),
            Some(WatchdogExpiry::Idle)
        );

        watchdog.on_event(start + Duration::from_secs(65));
        assert!(watchdog.expired(start + Duration::from_secs(100)).is_none());
    }
}
