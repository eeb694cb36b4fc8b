//! Paragraph and sentence splitting with source offsets.

/// A non-empty slice of the original string with its byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Span<'a> {
    fn trimmed(source: &'a str, start: usize, end: usize) -> Option<Self> {
        let raw = &source[start..end];
        let leading = raw.len() - raw.trim_start().len();
        let trailing = raw.trim_end().len();
        let (start, end) = (start + leading, start + trailing);
        if start >= end {
            return None;
        }
        Some(Span {
            text: &source[start..end],
            start,
            end,
        })
    }
}

/// Split into paragraphs on blank lines. Offsets index into `s`.
pub fn split_paragraphs(s: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for part in s.split("\n\n") {
        if let Some(span) = Span::trimmed(s, cursor, cursor + part.len()) {
            spans.push(span);
        }
        cursor += part.len() + 2;
    }
    spans
}

/// Split into sentences. A sentence ends at `.`, `!` or `?` (plus any
/// closing quotes/brackets) followed by whitespace. Offsets index into `s`.
pub fn split_sentences(s: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            // Swallow closing punctuation after the terminator.
            let mut end = i + c.len_utf8();
            while let Some(&(j, n)) = chars.peek() {
                if matches!(n, '"' | '\'' | ')' | ']' | '”' | '’') {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let at_boundary = chars
                .peek()
                .map(|&(_, n)| n.is_whitespace())
                .unwrap_or(true);
            if at_boundary {
                if let Some(span) = Span::trimmed(s, start, end) {
                    spans.push(span);
                }
                start = end;
            }
        }
    }

    if let Some(span) = Span::trimmed(s, start, s.len()) {
        spans.push(span);
    }
    spans
}
