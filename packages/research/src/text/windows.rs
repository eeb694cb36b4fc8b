//! Windowed chunking of source text.

use super::split::split_paragraphs;
use super::tokens::estimate_tokens;

/// Options for [`split_into_windows`].
#[derive(Debug, Clone)]
pub struct WindowOptions {
    /// Target size of a window, in estimated tokens.
    pub target_tokens: usize,
    /// Fraction of the target carried over as tail overlap between windows.
    pub overlap_ratio: f64,
    /// Accumulate whole paragraphs instead of slicing at fixed widths.
    pub respect_paragraphs: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            target_tokens: 1000,
            overlap_ratio: 0.15,
            respect_paragraphs: true,
        }
    }
}

/// A contiguous slice of the input, sized to a token budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub approx_tokens: usize,
}

/// Split text into overlapping windows. Every window's `text` equals
/// `s[char_start..char_end]` exactly, so offsets stay resolvable later.
pub fn split_into_windows(s: &str, opts: &WindowOptions) -> Vec<Window> {
    if s.is_empty() {
        return Vec::new();
    }

    let target_tokens = opts.target_tokens.max(1);
    let target_chars = target_tokens * 4;
    let overlap_chars = ((target_chars as f64) * opts.overlap_ratio.clamp(0.0, 0.9)) as usize;

    // Short input: one window covering everything.
    if s.len() <= target_chars {
        return vec![window_of(s, 0, s.len())];
    }

    if opts.respect_paragraphs {
        windows_by_paragraph(s, target_tokens, overlap_chars)
    } else {
        windows_fixed(s, target_chars, overlap_chars)
    }
}

fn window_of(s: &str, start: usize, end: usize) -> Window {
    let text = s[start..end].to_string();
    let approx_tokens = estimate_tokens(&text);
    Window {
        text,
        char_start: start,
        char_end: end,
        approx_tokens,
    }
}

fn windows_by_paragraph(s: &str, target_tokens: usize, overlap_chars: usize) -> Vec<Window> {
    let paragraphs = split_paragraphs(s);
    if paragraphs.is_empty() {
        return vec![window_of(s, 0, s.len())];
    }

    let mut windows = Vec::new();
    let mut win_start = paragraphs[0].start;
    let mut win_end = paragraphs[0].start;
    let mut win_tokens = 0usize;

    for para in &paragraphs {
        let para_tokens = estimate_tokens(para.text);
        if win_tokens > 0 && win_tokens + para_tokens > target_tokens {
            windows.push(window_of(s, win_start, win_end));
            win_start = floor_char_boundary(s, win_end.saturating_sub(overlap_chars)).max(win_start);
            win_tokens = estimate_tokens(&s[win_start..win_end]);
        }
        win_end = para.end;
        win_tokens += para_tokens;
    }

    if win_end > win_start {
        windows.push(window_of(s, win_start, win_end));
    }
    windows
}

fn windows_fixed(s: &str, target_chars: usize, overlap_chars: usize) -> Vec<Window> {
    let step = target_chars.saturating_sub(overlap_chars).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    while start < s.len() {
        let end = ceil_char_boundary(s, (start + target_chars).min(s.len()));
        windows.push(window_of(s, start, end));
        if end == s.len() {
            break;
        }
        start = ceil_char_boundary(s, start + step);
    }
    windows
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(target_tokens: usize) -> WindowOptions {
        WindowOptions {
            target_tokens,
            ..Default::default()
        }
    }

    #[test]
    fn short_input_is_one_full_window() {
        let s = "A short paragraph.\n\nAnother one.";
        let windows = split_into_windows(s, &WindowOptions::default());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].char_start, 0);
        assert_eq!(windows[0].char_end, s.len());
        assert_eq!(windows[0].text, s);
    }

    #[test]
    fn window_text_matches_offsets() {
        let s = (0..200)
            .map(|i| format!("Paragraph number {i} with a little bit of body text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let windows = split_into_windows(&s, &opts(100));
        assert!(windows.len() > 1);
        for w in &windows {
            assert_eq!(&s[w.char_start..w.char_end], w.text);
            assert!(w.char_start < w.char_end);
        }
    }

    #[test]
    fn consecutive_windows_overlap() {
        let s = (0..200)
            .map(|i| format!("Paragraph number {i} with a little bit of body text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let windows = split_into_windows(&s, &opts(100));
        for pair in windows.windows(2) {
            assert!(pair[1].char_start < pair[0].char_end, "windows should overlap");
            assert!(pair[1].char_end > pair[0].char_end, "windows should advance");
        }
    }

    #[test]
    fn fixed_mode_covers_entire_input() {
        let s = "x".repeat(10_000);
        let options = WindowOptions {
            target_tokens: 100,
            overlap_ratio: 0.15,
            respect_paragraphs: false,
        };
        let windows = split_into_windows(&s, &options);
        assert!(windows.len() > 1);
        assert_eq!(windows[0].char_start, 0);
        assert_eq!(windows.last().unwrap().char_end, s.len());
    }

    #[test]
    fn empty_input_yields_no_windows() {
        assert!(split_into_windows("", &WindowOptions::default()).is_empty());
    }

    #[test]
    fn multibyte_boundaries_are_respected() {
        let s = "é".repeat(5000);
        let options = WindowOptions {
            target_tokens: 100,
            overlap_ratio: 0.15,
            respect_paragraphs: false,
        };
        // Must not panic on char boundaries.
        let windows = split_into_windows(&s, &options);
        assert!(!windows.is_empty());
    }
}
