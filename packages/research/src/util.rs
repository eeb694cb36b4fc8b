//! Concurrency primitives shared across the pipeline.
//!
//! Every external call composes the same three tools: bounded fan-out,
//! retry with jittered exponential backoff, and a derived timeout that
//! respects the run's cancellation token.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::ResearchError;

/// Default timeout for a single external call.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Run `f` over `items` with at most `limit` futures in flight. Results
/// come back in input order.
pub async fn map_limit<T, U, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<U>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = U>,
{
    futures::stream::iter(items.into_iter().map(f))
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Retry `op` up to `max_retries` extra times on errors `is_transient`
/// accepts. Delay doubles each attempt from `base`, plus up to half a base
/// of jitter. Cancellation during a backoff sleep returns the last error.
pub async fn retry_backoff<T, E, F, Fut, C>(
    max_retries: u32,
    base: Duration,
    cancel: &CancellationToken,
    is_transient: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries || !is_transient(&err) || cancel.is_cancelled() {
                    return Err(err);
                }
                let backoff = base * 2u32.saturating_pow(attempt);
                let jitter =
                    Duration::from_millis(rand::rng().random_range(0..=base.as_millis().max(1) as u64 / 2));
                tokio::select! {
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(backoff + jitter) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Await `fut` for at most `duration`, aborting early if `cancel` fires.
/// Timeouts are surfaced as their own error so callers can decide whether
/// to treat them as cancellation.
pub async fn with_timeout<T>(
    what: &str,
    duration: Duration,
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, ResearchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResearchError::Cancelled),
        _ = tokio::time::sleep(duration) => Err(ResearchError::Timeout { what: what.to_string() }),
        out = fut => Ok(out),
    }
}
