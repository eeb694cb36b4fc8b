//! Tolerant quote location.
//!
//! Claim evidence arrives as LLM-transcribed quotes whose spacing, casing,
//! and typography rarely match the source byte-for-byte. Matching ignores
//! case and whitespace and folds typographic quotes/dashes, then maps the
//! match back to byte offsets in the haystack.

/// Options for [`find_quote_offsets`].
#[derive(Debug, Clone)]
pub struct QuoteMatchOptions {
    /// Upper bound on comparison steps before giving up.
    pub max_steps: usize,
}

impl Default for QuoteMatchOptions {
    fn default() -> Self {
        Self {
            max_steps: 2_000_000,
        }
    }
}

/// One normalized character with the byte range it came from.
#[derive(Debug, Clone, Copy)]
struct NormChar {
    ch: char,
    start: usize,
    end: usize,
}

/// Fold a character to its match form. Whitespace folds to `None`.
fn fold(c: char) -> Option<char> {
    if c.is_whitespace() {
        return None;
    }
    Some(match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
        '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
        _ => c.to_ascii_lowercase(),
    })
}

fn normalize(s: &str) -> Vec<NormChar> {
    let mut out = Vec::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        if let Some(folded) = fold(c) {
            // Non-ASCII lowercase can expand; take the first char, which is
            // enough for match equivalence on real-world text.
            let ch = folded
                .to_lowercase()
                .next()
                .unwrap_or(folded);
            out.push(NormChar {
                ch,
                start: i,
                end: i + c.len_utf8(),
            });
        }
    }
    out
}

/// Locate `needle` in `hay` under tolerant matching. Returns byte offsets
/// `(start, end)` into `hay`, or `None` if absent or the step budget runs
/// out. Pure; never panics.
pub fn find_quote_offsets(
    hay: &str,
    needle: &str,
    opts: &QuoteMatchOptions,
) -> Option<(usize, usize)> {
    let hay_norm = normalize(hay);
    let needle_norm = normalize(needle);

    if needle_norm.is_empty() || needle_norm.len() > hay_norm.len() {
        return None;
    }

    let mut steps = 0usize;
    let last_start = hay_norm.len() - needle_norm.len();

    'outer: for i in 0..=last_start {
        for (j, nc) in needle_norm.iter().enumerate() {
            steps += 1;
            if steps > opts.max_steps {
                return None;
            }
            if hay_norm[i + j].ch != nc.ch {
                continue 'outer;
            }
        }
        let start = hay_norm[i].start;
        let end = hay_norm[i + needle_norm.len() - 1].end;
        return Some((start, end));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(hay: &str, needle: &str) -> Option<(usize, usize)> {
        find_quote_offsets(hay, needle, &QuoteMatchOptions::default())
    }

    #[test]
    fn exact_match() {
        let hay = "The quick brown fox.";
        let (start, end) = find(hay, "quick brown").unwrap();
        assert_eq!(&hay[start..end], "quick brown");
    }

    #[test]
    fn case_insensitive() {
        let hay = "The Quick Brown Fox.";
        let (start, end) = find(hay, "quick brown").unwrap();
        assert_eq!(&hay[start..end], "Quick Brown");
    }

    #[test]
    fn whitespace_differences_ignored() {
        let hay = "The Curie temperature of iron is 770 °C at standard pressure.";
        let (start, end) = find(hay, "Curie temperature of iron is 770°C").unwrap();
        assert_eq!(start, hay.find("Curie").unwrap());
        assert_eq!(&hay[start..end], "Curie temperature of iron is 770 °C");
    }

    #[test]
    fn curly_quotes_fold_to_straight() {
        let hay = "She called it \u{201C}the turning point\u{201D} of the war.";
        let (start, end) = find(hay, "\"the turning point\"").unwrap();
        assert_eq!(&hay[start..end], "\u{201C}the turning point\u{201D}");
    }

    #[test]
    fn dashes_fold_to_hyphen() {
        let hay = "A long\u{2014}awaited result";
        assert!(find(hay, "long-awaited").is_some());
    }

    #[test]
    fn absent_needle_is_none() {
        assert!(find("nothing here", "absent quote").is_none());
    }

    #[test]
    fn empty_needle_is_none() {
        assert!(find("hay", "").is_none());
        assert!(find("hay", "   ").is_none());
    }

    #[test]
    fn step_budget_bounds_work() {
        let hay = "ab".repeat(5000);
        let needle = format!("{}c", "ab".repeat(400));
        let tight = QuoteMatchOptions { max_steps: 100 };
        assert!(find_quote_offsets(&hay, &needle, &tight).is_none());
    }

    #[test]
    fn match_slice_normalizes_to_needle() {
        let hay = "Values of  7\u{2013}9 were   reported.";
        let (start, end) = find(hay, "values of 7-9 were reported.").unwrap();
        let slice = &hay[start..end];
        let norm = |s: &str| {
            s.chars()
                .filter_map(super::fold)
                .collect::<String>()
        };
        assert_eq!(norm(slice), norm("values of 7-9 were reported."));
    }
}
