//! Text toolkit: sanitization, token estimation, splitting, windowed
//! chunking and tolerant quote matching.
//!
//! Everything here is pure and total: no I/O, no errors, deterministic
//! output for a given input.

mod quotes;
mod sanitize;
mod split;
mod tokens;
mod windows;

pub use quotes::{find_quote_offsets, QuoteMatchOptions};
pub use sanitize::{sanitize, SanitizeOptions};
pub use split::{split_paragraphs, split_sentences, Span};
pub use tokens::estimate_tokens;
pub use windows::{split_into_windows, Window, WindowOptions};
