//! Domain types shared across the pipeline.

mod claim;
mod request;
mod source;
mod thread;

pub use claim::{Claim, ClaimEvidence, VerifiedClaim, VerifiedEvidence};
pub use request::{Depth, Plan, ResearchRequest, TimeRange};
pub use source::{Chunk, ChunkHit, NewChunk, NewSource, Source, SourceRef, SourceStatus};
pub use thread::{Citation, Message, Role, Thread};
