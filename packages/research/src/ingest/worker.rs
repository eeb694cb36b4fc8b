//! Batch worker for the durable ingest queue.
//!
//! Triggered over HTTP or by a timer. Revives stale claims, claims a
//! batch, processes it with a bounded pool, and reports counts.

use serde::Serialize;
use tracing::{info, warn};

use super::{IngestOutcome, Ingestor};
use crate::error::Result;
use crate::reader::ReadOptions;
use crate::util::map_limit;

/// Options for one worker batch.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Maximum rows claimed this run.
    pub limit: i64,
    /// Concurrent ingests within the batch.
    pub concurrency: usize,
    /// `processing` rows older than this are considered abandoned.
    pub revive_stale_secs: i64,
    /// Attempts before a row parks as `error`.
    pub max_attempts: i64,
    /// Report counts without claiming or processing anything.
    pub dry_run: bool,
    pub read: ReadOptions,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            concurrency: 4,
            revive_stale_secs: 300,
            max_attempts: 3,
            dry_run: false,
            read: ReadOptions::default(),
        }
    }
}

/// Counts from one worker batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub revived: u64,
    pub claimed: usize,
    pub processed: usize,
    pub ok: usize,
    pub exists: usize,
    pub requeued: usize,
    pub errors: usize,
    pub remaining: i64,
}

/// Run one batch of queued ingests.
pub async fn run_batch(ingestor: &Ingestor, opts: &WorkerOptions) -> Result<BatchStats> {
    let store = ingestor.store();
    let mut stats = BatchStats {
        revived: store.revive_stale(opts.revive_stale_secs).await?,
        ..Default::default()
    };

    if opts.dry_run {
        stats.remaining = store.queued_count().await?;
        return Ok(stats);
    }

    let items = store.claim_queue_batch(opts.limit).await?;
    stats.claimed = items.len();

    let outcomes = map_limit(items, opts.concurrency.max(1), |item| {
        let ingestor = ingestor.clone();
        let read = opts.read.clone();
        async move {
            let outcome = ingestor.ingest_now(&item.url, &read).await;
            (item, outcome)
        }
    })
    .await;

    for (item, outcome) in outcomes {
        stats.processed += 1;
        match outcome {
            Ok(IngestOutcome::Ok { .. }) => {
                store.complete_queue_item(&item.id).await?;
                stats.ok += 1;
            }
            Ok(IngestOutcome::Exists { .. }) => {
                store.complete_queue_item(&item.id).await?;
                stats.exists += 1;
            }
            Ok(IngestOutcome::Queued) => {
                // ingest_now never queues; treat as a logic failure.
                store
                    .fail_queue_item(&item.id, item.attempts, "unexpected queued outcome", opts.max_attempts)
                    .await?;
                stats.errors += 1;
            }
            Ok(IngestOutcome::Failed { message }) => {
                warn!(url = %item.url, error = %message, "queued ingest failed");
                if store
                    .fail_queue_item(&item.id, item.attempts, &message, opts.max_attempts)
                    .await?
                {
                    stats.requeued += 1;
                } else {
                    stats.errors += 1;
                }
            }
            Err(err) => {
                warn!(url = %item.url, error = %err, "queued ingest errored");
                if store
                    .fail_queue_item(&item.id, item.attempts, &err.to_string(), opts.max_attempts)
                    .await?
                {
                    stats.requeued += 1;
                } else {
                    stats.errors += 1;
                }
            }
        }
    }

    stats.remaining = store.queued_count().await?;
    info!(
        claimed = stats.claimed,
        ok = stats.ok,
        exists = stats.exists,
        requeued = stats.requeued,
        errors = stats.errors,
        remaining = stats.remaining,
        "ingest batch finished"
    );
    Ok(stats)
}
