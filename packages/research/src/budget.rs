//! Token-budget control for LLM prompts.
//!
//! Deterministic and allocation-light: token counts come from
//! [`crate::text::estimate_tokens`], computed once per chunk.

use crate::text::estimate_tokens;
use crate::types::ChunkHit;

/// Minimum usable context, even under a hostile budget.
const FLOOR_TOKENS: usize = 300;

/// Keep chunks in order until the budget (minus `reserve`) would be
/// exceeded. Non-empty input always yields at least one chunk.
pub fn trim_chunks_to_budget(
    chunks: Vec<ChunkHit>,
    budget_tokens: usize,
    reserve: usize,
) -> Vec<ChunkHit> {
    let cap = budget_tokens.saturating_sub(reserve).max(FLOOR_TOKENS);

    let mut kept = Vec::new();
    let mut used = 0usize;
    for chunk in chunks {
        let cost = estimate_tokens(&chunk.text);
        if !kept.is_empty() && used + cost > cap {
            break;
        }
        used += cost;
        kept.push(chunk);
    }
    kept
}

/// Bound a chunk's text to `max_chars` characters, keeping the head (70%)
/// and tail (30%) joined by an ellipsis line. Both ends survive because
/// citations tend to live near either edge of a chunk.
pub fn shrink_chunk_text(text: &str, max_chars: usize) -> String {
    let total: usize = text.chars().count();
    if total <= max_chars || max_chars == 0 {
        return text.to_string();
    }

    let head_chars = max_chars * 7 / 10;
    let tail_chars = max_chars - head_chars;

    let head: String = text.chars().take(head_chars).collect();
    let tail: String = {
        let skip = total - tail_chars;
        text.chars().skip(skip).collect()
    };

    format!("{head}\n…\n{tail}")
}
