//! Deterministic token estimation.
//!
//! The budgeter needs a fast, provider-independent upper-ish bound on how
//! many tokens a string will cost. Two heuristics are computed and the
//! larger wins: character count / 4, and word count × 1.25 plus punctuation
//! × 0.2. Non-ASCII characters tokenize worse, so they add a small penalty.

/// Estimate the token cost of a string.
pub fn estimate_tokens(s: &str) -> usize {
    if s.is_empty() {
        return 0;
    }

    let mut chars = 0usize;
    let mut punct = 0usize;
    let mut non_ascii = 0usize;
    for c in s.chars() {
        chars += 1;
        if c.is_ascii_punctuation() {
            punct += 1;
        }
        if !c.is_ascii() {
            non_ascii += 1;
        }
    }
    let words = s.split_whitespace().count();

    let by_chars = chars as f64 / 4.0;
    let by_words = words as f64 * 1.25 + punct as f64 * 0.2;
    let penalty = non_ascii as f64 * 0.25;

    (by_chars.max(by_words) + penalty).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn is_deterministic() {
        let s = "The Curie temperature of iron is 770 °C.";
        assert_eq!(estimate_tokens(s), estimate_tokens(s));
    }

    #[test]
    fn scales_with_length() {
        let short = estimate_tokens("one two three");
        let long = estimate_tokens(&"one two three ".repeat(50));
        assert!(long > short * 30);
    }

    #[test]
    fn non_ascii_costs_more() {
        let ascii = estimate_tokens("aaaa aaaa aaaa");
        let cyrillic = estimate_tokens("аааа аааа аааа");
        assert!(cyrillic > ascii);
    }

    #[test]
    fn word_heuristic_dominates_dense_text() {
        // Many short words: word heuristic exceeds chars/4.
        let s = "a b c d e f g h";
        assert!(estimate_tokens(s) >= 10);
    }
}
