//! Server-sent event protocol: frame encoding, a backpressured writer, and
//! a chunk-tolerant client decoder.

mod sse;

pub use sse::{
    encode_comment, encode_frame, spawn_heartbeat, SseDecoder, SseFrame, SseMessage, SseWriter,
    Watchdog, WatchdogExpiry, CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, IDLE_TIMEOUT,
};
