//! Input sanitization for ingested page text.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Options for [`sanitize`].
#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Apply Unicode NFKC normalization.
    pub normalize: bool,
    /// Keep tab, newline and carriage return; other control chars always go.
    pub keep_line_breaks: bool,
    /// Decode common HTML entities.
    pub decode_entities: bool,
    /// Collapse whitespace runs to a single space / single blank line.
    pub collapse_whitespace: bool,
    /// Strip markdown syntax (emphasis, headings, links, code fences).
    pub strip_markdown: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            keep_line_breaks: true,
            decode_entities: false,
            collapse_whitespace: false,
            strip_markdown: false,
        }
    }
}

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x?[0-9a-fA-F]{1,6});").unwrap());
static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static MD_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static MD_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*{1,3}|_{1,3}|~~|`+)").unwrap());
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean raw text for storage and chunking.
pub fn sanitize(input: &str, opts: &SanitizeOptions) -> String {
    let mut text: String = if opts.normalize {
        input.nfkc().collect()
    } else {
        input.to_string()
    };

    if opts.decode_entities {
        text = decode_entities(&text);
    }

    text = text
        .chars()
        .filter(|&c| {
            if c == '\t' || c == '\n' || c == '\r' {
                opts.keep_line_breaks
            } else {
                !c.is_control()
            }
        })
        .collect();

    // Normalize newlines before any whitespace collapsing.
    text = text.replace("\r\n", "\n").replace('\r', "\n");

    if opts.strip_markdown {
        text = MD_LINK.replace_all(&text, "$1").into_owned();
        text = MD_HEADING.replace_all(&text, "").into_owned();
        text = MD_EMPHASIS.replace_all(&text, "").into_owned();
    }

    if opts.collapse_whitespace {
        text = SPACE_RUN.replace_all(&text, " ").into_owned();
        text = BLANK_RUN.replace_all(&text, "\n\n").into_owned();
        text = text.trim().to_string();
    }

    text
}

fn decode_entities(s: &str) -> String {
    let mut out = s
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    out = NUMERIC_ENTITY
        .replace_all(&out, |caps: &regex::Captures| {
            let body = &caps[1];
            let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                body.parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    // &amp; last so freshly decoded ampersands don't cascade.
    out.replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let opts = SanitizeOptions::default();
        let got = sanitize("a\u{0000}b\u{0007}c", &opts);
        assert_eq!(got, "abc");
    }

    #[test]
    fn keeps_line_breaks_when_asked() {
        let opts = SanitizeOptions::default();
        assert_eq!(sanitize("a\nb\tc", &opts), "a\nb\tc");

        let no_breaks = SanitizeOptions {
            keep_line_breaks: false,
            ..Default::default()
        };
        assert_eq!(sanitize("a\nb\tc", &no_breaks), "abc");
    }

    #[test]
    fn decodes_entities() {
        let opts = SanitizeOptions {
            decode_entities: true,
            ..Default::default()
        };
        assert_eq!(sanitize("a &amp; b &lt;c&gt; &#233;", &opts), "a & b <c> é");
    }

    #[test]
    fn amp_decode_does_not_cascade() {
        let opts = SanitizeOptions {
            decode_entities: true,
            ..Default::default()
        };
        assert_eq!(sanitize("&amp;lt;", &opts), "&lt;");
    }

    #[test]
    fn collapses_whitespace() {
        let opts = SanitizeOptions {
            collapse_whitespace: true,
            ..Default::default()
        };
        assert_eq!(sanitize("a   b\n\n\n\nc", &opts), "a b\n\nc");
    }

    #[test]
    fn strips_markdown() {
        let opts = SanitizeOptions {
            strip_markdown: true,
            ..Default::default()
        };
        let got = sanitize("# Title\n**bold** and [link](https://x.test)", &opts);
        assert_eq!(got, "Title\nbold and link");
    }

    #[test]
    fn nfkc_normalizes_compatibility_forms() {
        let opts = SanitizeOptions::default();
        assert_eq!(sanitize("ﬁle", &opts), "file");
    }
}
