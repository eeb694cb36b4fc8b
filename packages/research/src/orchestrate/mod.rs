//! The staged research pipeline.
//!
//! plan → search → read → rank → answer → verify → done, with a single
//! cancellation token cascading into every external call and an event
//! channel carrying progress out. Local recovery (plan parse failures,
//! empty FTS, oversized prompts) stays inside the stage; anything else
//! surfaces as one `error` event and ends the run.

mod events;

pub use events::{ResearchEvent, Stage};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{shrink_chunk_text, trim_chunks_to_budget};
use crate::error::{ResearchError, Result};
use crate::ingest::{IngestOptions, Ingestor};
use crate::llm::{Llm, LlmRequest};
use crate::prompts::{answer_prompt, plan_prompt, VerifySnippet};
use crate::rank::{RankOptions, Ranker};
use crate::reader::{ReadOptions, ReaderPreference};
use crate::search::{SearchAdapter, SearchHit, SearchOptions};
use crate::store::Store;
use crate::text::estimate_tokens;
use crate::types::{ChunkHit, Plan, ResearchRequest, Role, SourceRef, VerifiedClaim};
use crate::util::{map_limit, with_timeout};
use crate::verify::{tolerant_json, verify, VerifyOptions};
use llm_client::ModelAlias;

/// The canned reply when no usable sources surface.
const NO_SOURCES_ANSWER: &str = "I could not find suitable sources to answer this question. \
Try rephrasing it, widening the time range, or removing domain restrictions.";

/// Tunables for a run. Environment mapping happens at the server boundary.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sources read inline per run (1..24).
    pub inline_cap: usize,
    pub search_concurrency: usize,
    pub read_concurrency: usize,
    pub request_timeout: Duration,
    pub reader_prefer: ReaderPreference,

    pub rank_cap: usize,
    pub per_source_limit: usize,
    pub enable_rerank: bool,

    pub answer_budget_tokens: usize,
    pub answer_overhead_tokens: usize,
    pub max_chars_per_chunk: usize,

    pub verify_budget_tokens: usize,
    pub verify_overhead_tokens: usize,
    pub verify_chunk_chars: usize,
    /// Above this estimated prompt size, verification is skipped outright.
    pub verify_hard_ceiling_tokens: usize,
    pub skip_verify_on_tpm: bool,
    pub max_claims: usize,
    pub nli_contradiction_check: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inline_cap: 12,
            search_concurrency: 3,
            read_concurrency: 3,
            request_timeout: Duration::from_millis(crate::util::REQUEST_TIMEOUT_MS),
            reader_prefer: ReaderPreference::default(),
            rank_cap: 24,
            per_source_limit: 3,
            enable_rerank: false,
            answer_budget_tokens: 3200,
            answer_overhead_tokens: 800,
            max_chars_per_chunk: 900,
            verify_budget_tokens: 1500,
            verify_overhead_tokens: 500,
            verify_chunk_chars: 400,
            verify_hard_ceiling_tokens: 5000,
            skip_verify_on_tpm: true,
            max_claims: 12,
            nli_contradiction_check: false,
        }
    }
}

/// Drives one research run from question to verified answer.
pub struct Orchestrator {
    store: Store,
    llm: Arc<dyn Llm>,
    search: SearchAdapter,
    ingestor: Ingestor,
    ranker: Ranker,
    config: PipelineConfig,
}

struct RunContext {
    cancel: CancellationToken,
    tx: mpsc::Sender<ResearchEvent>,
}

impl RunContext {
    /// Forward an event. A dropped receiver means the client went away;
    /// that is a cancellation, not an error.
    async fn emit(&self, event: ResearchEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| ResearchError::Cancelled)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ResearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Orchestrator {
    pub fn new(
        store: Store,
        llm: Arc<dyn Llm>,
        search: SearchAdapter,
        ingestor: Ingestor,
        ranker: Ranker,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            llm,
            search,
            ingestor,
            ranker,
            config,
        }
    }

    /// Run the pipeline. Exactly one `done` or `error` event is emitted,
    /// unless the run is cancelled, in which case the stream just ends.
    pub async fn run(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
        tx: mpsc::Sender<ResearchEvent>,
    ) {
        let ctx = RunContext {
            cancel: cancel.clone(),
            tx,
        };
        match self.run_inner(&request, &ctx).await {
            Ok(()) => {}
            Err(err) if err.is_cancellation() || cancel.is_cancelled() => {
                debug!("research run cancelled");
            }
            Err(err) => {
                warn!(error = %err, "research run failed");
                let _ = ctx
                    .tx
                    .send(ResearchEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_inner(&self, request: &ResearchRequest, ctx: &RunContext) -> Result<()> {
        request.validate()?;

        let title: String = request.question.chars().take(80).collect();
        let thread = self
            .store
            .insert_thread(&title, request.visitor_id.as_deref())
            .await?;
        self.store
            .insert_message(&thread.id, Role::User, &request.question)
            .await?;

        // Plan
        ctx.emit(ResearchEvent::progress(Stage::Plan, "Planning subqueries"))
            .await?;
        let plan = self.plan(request, ctx).await?;

        // Search
        let hits = self.search_stage(request, &plan, &thread.id, ctx).await?;
        ctx.emit(ResearchEvent::progress(
            Stage::Search,
            format!("Found {} unique URLs", hits.len()),
        ))
        .await?;

        if hits.is_empty() {
            return self.finish_without_sources(&thread.id, ctx).await;
        }

        // Read
        self.read_stage(&hits, ctx).await?;

        // Rank
        let mut queries = vec![request.question.clone()];
        queries.extend(plan.subqueries.iter().cloned());
        let ranked = self
            .ranker
            .rank_for_queries(
                &queries,
                &RankOptions {
                    cap: self.config.rank_cap,
                    per_source_limit: self.config.per_source_limit,
                    enable_rerank: self.config.enable_rerank,
                    ..Default::default()
                },
            )
            .await?;
        ctx.checkpoint()?;

        if ranked.is_empty() {
            ctx.emit(ResearchEvent::progress(Stage::Rank, "Selected 0 snippets"))
                .await?;
            return self.finish_without_sources(&thread.id, ctx).await;
        }

        // Budget: bound each chunk, then trim the list to the input budget.
        let shrunk: Vec<ChunkHit> = ranked
            .into_iter()
            .map(|mut chunk| {
                chunk.text = shrink_chunk_text(&chunk.text, self.config.max_chars_per_chunk);
                chunk
            })
            .collect();
        let kept = trim_chunks_to_budget(
            shrunk.clone(),
            self.config.answer_budget_tokens,
            self.config.answer_overhead_tokens,
        );
        let sources = self.source_refs(&kept).await?;

        ctx.emit(ResearchEvent::Sources(sources.clone())).await?;
        ctx.emit(ResearchEvent::progress(
            Stage::Rank,
            format!("Selected {} snippets", kept.len()),
        ))
        .await?;

        // Answer
        let (answer_text, kept, sources) = self
            .answer_stage(request, shrunk, kept, sources, ctx)
            .await?;

        // Verify
        let claims = self.verify_stage(&answer_text, &kept, ctx).await?;
        let assistant = self
            .store
            .insert_message(&thread.id, Role::Assistant, &answer_text)
            .await?;
        for chunk in &kept {
            let quote: String = chunk.text.chars().take(200).collect();
            self.store
                .insert_citation(
                    &assistant.id,
                    &chunk.source_id,
                    Some(&chunk.id),
                    &quote,
                    None,
                    None,
                    Some(chunk.score),
                )
                .await?;
        }
        if let Some(claims) = &claims {
            self.store
                .persist_verified_claims(&assistant.id, claims)
                .await?;
        }
        ctx.emit(ResearchEvent::Claims {
            claims: claims.unwrap_or_default(),
        })
        .await?;

        info!(thread_id = %thread.id, sources = sources.len(), "research run complete");
        ctx.emit(ResearchEvent::Done {
            thread_id: thread.id,
        })
        .await
    }

    /// Plan stage: LLM decomposition with a naive fallback.
    async fn plan(&self, request: &ResearchRequest, ctx: &RunContext) -> Result<Plan> {
        let pair = plan_prompt(request);
        let llm_result = with_timeout(
            "plan",
            self.config.request_timeout,
            &ctx.cancel,
            self.llm.generate(
                LlmRequest::new(ModelAlias::Plan, pair.user)
                    .with_system(pair.system)
                    .with_cancel(ctx.cancel.clone()),
            ),
        )
        .await;

        let raw = match llm_result {
            Ok(Ok(raw)) => raw,
            Err(err @ ResearchError::Cancelled) => return Err(err),
            Ok(Err(llm_client::LlmError::Cancelled)) => return Err(ResearchError::Cancelled),
            Ok(Err(err)) => {
                warn!(error = %err, "planner unavailable; using naive plan");
                String::new()
            }
            Err(_) => String::new(), // timeout degrades to the naive plan
        };

        let plan = match tolerant_json::<Plan>(&raw) {
            Some(plan) => plan,
            None => {
                ctx.emit(ResearchEvent::progress(
                    Stage::Plan,
                    "Plan output unusable; falling back to the question",
                ))
                .await?;
                Plan::naive(&request.question)
            }
        };
        Ok(plan.capped(request.depth, &request.question))
    }

    /// Search stage: subqueries with bounded concurrency, merged and
    /// deduplicated preserving the first-seen title.
    async fn search_stage(
        &self,
        request: &ResearchRequest,
        plan: &Plan,
        thread_id: &str,
        ctx: &RunContext,
    ) -> Result<Vec<SearchHit>> {
        let opts = SearchOptions {
            size: request.depth.results_per_query(),
            time_range: request.time_range.clone(),
            allowed_domains: request.allowed_domains.clone(),
            disallowed_domains: request.disallowed_domains.clone(),
            region: request.region.clone(),
            timeout: self.config.request_timeout,
            cancel: ctx.cancel.clone(),
        };

        let results = map_limit(
            plan.subqueries.clone(),
            self.config.search_concurrency,
            |subquery| {
                let search = self.search.clone();
                let opts = opts.clone();
                async move {
                    let hits = search.search(&subquery, &opts).await;
                    (subquery, hits)
                }
            },
        )
        .await;
        ctx.checkpoint()?;

        let mut merged: Vec<SearchHit> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut last_error: Option<ResearchError> = None;

        for (subquery, result) in results {
            match result {
                Ok(hits) => {
                    let json = serde_json::to_string(&hits).unwrap_or_else(|_| "[]".into());
                    self.store
                        .insert_search_event(Some(thread_id), &subquery, &json)
                        .await?;
                    for hit in hits {
                        if seen.insert(hit.url.clone()) {
                            merged.push(hit);
                        }
                    }
                }
                Err(err) => {
                    warn!(query = %subquery, error = %err, "subquery search failed");
                    last_error = Some(err.into());
                }
            }
        }

        // All subqueries failing is a run failure; partial failure is not.
        if merged.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(merged)
    }

    /// Read stage: inline-ingest the top URLs, reporting progress every
    /// other read. Failures are dropped; the pipeline continues.
    async fn read_stage(&self, hits: &[SearchHit], ctx: &RunContext) -> Result<()> {
        let take = self.config.inline_cap.clamp(1, 24).min(hits.len());
        let urls: Vec<String> = hits.iter().take(take).map(|h| h.url.clone()).collect();
        let total = urls.len();

        let done = Arc::new(AtomicUsize::new(0));
        let ingest_opts = IngestOptions {
            immediate: true,
            priority: 0,
            read: ReadOptions {
                timeout: self.config.request_timeout,
                prefer: self.config.reader_prefer,
                cancel: ctx.cancel.clone(),
                ..Default::default()
            },
        };

        let outcomes = map_limit(urls, self.config.read_concurrency.clamp(1, 4), |url| {
            let ingestor = self.ingestor.clone();
            let opts = ingest_opts.clone();
            let done = done.clone();
            let tx = ctx.tx.clone();
            let cancel = ctx.cancel.clone();
            async move {
                let outcome = ingestor.ingest(&url, &opts).await;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                if (n % 2 == 0 || n == total) && !cancel.is_cancelled() {
                    let _ = tx
                        .send(ResearchEvent::progress(
                            Stage::Read,
                            format!("Read {n}/{total}"),
                        ))
                        .await;
                }
                (url, outcome)
            }
        })
        .await;
        ctx.checkpoint()?;

        for (url, outcome) in outcomes {
            match outcome {
                Ok(outcome) => debug!(url = %url, status = outcome.status(), "read"),
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => warn!(url = %url, error = %err, "read failed"),
            }
        }
        Ok(())
    }

    /// Stream the answer, retrying once with a halved budget on token
    /// errors, and emit the full text afterwards.
    async fn answer_stage(
        &self,
        request: &ResearchRequest,
        shrunk: Vec<ChunkHit>,
        kept: Vec<ChunkHit>,
        sources: Vec<SourceRef>,
        ctx: &RunContext,
    ) -> Result<(String, Vec<ChunkHit>, Vec<SourceRef>)> {
        let mut budget = self.config.answer_budget_tokens;
        let mut kept = kept;
        let mut sources = sources;

        ctx.emit(ResearchEvent::progress(Stage::Answer, "Writing answer"))
            .await?;

        let mut retried = false;
        let text = loop {
            let pair = answer_prompt(&request.question, &sources, &kept);
            let stream_result = self
                .llm
                .stream(
                    LlmRequest::new(ModelAlias::Answer, pair.user)
                        .with_system(pair.system)
                        .with_cancel(ctx.cancel.clone()),
                )
                .await;

            match stream_result {
                Ok(mut stream) => {
                    let mut text = String::new();
                    while let Some(delta) = stream.next().await {
                        let delta = delta?;
                        if delta.is_empty() {
                            continue;
                        }
                        text.push_str(&delta);
                        ctx.emit(ResearchEvent::Token(delta)).await?;
                    }
                    ctx.checkpoint()?;
                    break text;
                }
                Err(err) if err.is_budget() && !retried => {
                    retried = true;
                    budget = (budget / 2).max(600);
                    kept = trim_chunks_to_budget(
                        shrunk.clone(),
                        budget,
                        self.config.answer_overhead_tokens,
                    );
                    sources = self.source_refs(&kept).await?;
                    ctx.emit(ResearchEvent::progress(
                        Stage::Answer,
                        "Context too large; retrying with smaller context",
                    ))
                    .await?;
                }
                Err(err) => return Err(err.into()),
            }
        };

        ctx.emit(ResearchEvent::Answer { text: text.clone() }).await?;
        Ok((text, kept, sources))
    }

    /// Verify stage: aggressively trimmed snippets, a hard skip ceiling,
    /// and TPM-tolerant skipping. Returns `None` when verification was
    /// skipped (nothing is persisted in that case).
    async fn verify_stage(
        &self,
        answer_text: &str,
        kept: &[ChunkHit],
        ctx: &RunContext,
    ) -> Result<Option<Vec<VerifiedClaim>>> {
        ctx.emit(ResearchEvent::progress(Stage::Verify, "Verifying claims"))
            .await?;

        let snippets_chunks = trim_chunks_to_budget(
            kept.iter()
                .map(|chunk| {
                    let mut chunk = chunk.clone();
                    chunk.text = shrink_chunk_text(&chunk.text, self.config.verify_chunk_chars);
                    chunk
                })
                .collect(),
            self.config.verify_budget_tokens,
            self.config.verify_overhead_tokens,
        );

        let estimated: usize = estimate_tokens(answer_text)
            + snippets_chunks
                .iter()
                .map(|c| estimate_tokens(&c.text))
                .sum::<usize>()
            + self.config.verify_overhead_tokens;
        if estimated > self.config.verify_hard_ceiling_tokens {
            warn!(estimated, "verification prompt too large; skipping");
            return Ok(None);
        }

        let snippets: Vec<VerifySnippet> = snippets_chunks
            .iter()
            .map(|chunk| VerifySnippet {
                source_id: chunk.source_id.clone(),
                chunk_id: Some(chunk.id.clone()),
                text: chunk.text.clone(),
            })
            .collect();
        let chunk_ids: Vec<String> = snippets_chunks.iter().map(|c| c.id.clone()).collect();
        let chunk_texts: HashMap<String, String> =
            self.store.chunk_texts_by_ids(&chunk_ids).await?;

        let result = verify(
            self.llm.as_ref(),
            answer_text,
            &snippets,
            &chunk_texts,
            &VerifyOptions {
                max_claims: self.config.max_claims,
                bind_offsets: true,
                nli_contradiction_check: self.config.nli_contradiction_check,
                cancel: ctx.cancel.clone(),
                ..Default::default()
            },
        )
        .await;

        match result {
            Ok(claims) => Ok(Some(claims)),
            Err(ResearchError::Llm(err)) if err.is_budget() && self.config.skip_verify_on_tpm => {
                warn!(error = %err, "verification hit a token limit; skipping");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Minimal source references: only sources present in the kept chunks,
    /// numbered in first-appearance order.
    async fn source_refs(&self, kept: &[ChunkHit]) -> Result<Vec<SourceRef>> {
        let mut refs: Vec<SourceRef> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for chunk in kept {
            if !seen.insert(chunk.source_id.clone()) {
                continue;
            }
            if let Some(source) = self.store.source_by_id(&chunk.source_id).await? {
                refs.push(SourceRef {
                    id: source.id,
                    url: source.url,
                    title: source.title,
                    domain: Some(source.domain),
                    index: refs.len() + 1,
                });
            }
        }
        Ok(refs)
    }

    /// Empty-search path: empty `sources`, a canned assistant message,
    /// empty `claims`, then `done`.
    async fn finish_without_sources(&self, thread_id: &str, ctx: &RunContext) -> Result<()> {
        ctx.emit(ResearchEvent::Sources(Vec::new())).await?;
        self.store
            .insert_message(thread_id, Role::Assistant, NO_SOURCES_ANSWER)
            .await?;
        ctx.emit(ResearchEvent::Claims { claims: Vec::new() }).await?;
        ctx.emit(ResearchEvent::Done {
            thread_id: thread_id.to_string(),
        })
        .await
    }
}
