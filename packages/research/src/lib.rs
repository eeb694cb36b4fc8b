//! Evidence-first research pipeline.
//!
//! Given a natural-language question, the pipeline plans subqueries,
//! searches the web, ingests and chunks candidate pages into a SQLite
//! FTS5 index, ranks snippets, streams a cited answer, and extracts atomic
//! claims bound to verbatim quotes with character offsets.
//!
//! # Architecture
//!
//! - [`text`] — sanitization, token estimation, windowed chunking,
//!   tolerant quote matching
//! - [`store`] — durable tables + FTS index with trigger maintenance
//! - [`reader`] — URL → cleaned text, readability service with raw fallback
//! - [`search`] — provider seam with retry/loosen/fallback policy
//! - [`ingest`] — dedup, fetch, chunk, persist; inline or queued
//! - [`rank`] — BM25 per subquery, fusion, diversification, rerank
//! - [`budget`] — token budgeting for LLM prompts
//! - [`llm`] — gateway seam over `llm-client`
//! - [`verify`] — claim extraction and offset binding
//! - [`orchestrate`] — the staged pipeline and its event stream
//! - [`protocol`] — SSE encoding/decoding with heartbeats
//!
//! The pipeline talks to traits at every external seam (LLM, searcher,
//! reader, reranker); [`testing`] provides scripted mocks for all of them.

pub mod budget;
pub mod canonical;
pub mod error;
pub mod ids;
pub mod ingest;
pub mod llm;
pub mod orchestrate;
pub mod prompts;
pub mod protocol;
pub mod rank;
pub mod reader;
pub mod search;
pub mod secret;
pub mod store;
pub mod testing;
pub mod text;
pub mod types;
pub mod util;
pub mod verify;

pub use error::{ReadError, ResearchError, Result, SearchError};
pub use ids::{is_ulid, new_id, new_ulid};
pub use orchestrate::{Orchestrator, PipelineConfig, ResearchEvent, Stage};
pub use store::Store;
pub use types::{
    Chunk, ChunkHit, Citation, Claim, ClaimEvidence, Depth, Message, NewChunk, NewSource, Plan,
    ResearchRequest, Role, Source, SourceRef, SourceStatus, Thread, TimeRange, VerifiedClaim,
    VerifiedEvidence,
};
