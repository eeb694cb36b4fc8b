//! Lightweight HTML handling for raw page reads.
//!
//! This is deliberately regex-based: the reader needs legible text, a
//! title and a language hint, not a DOM.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static BR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static P_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p\s*>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static HTML_LANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<html[^>]*\blang\s*=\s*["']?([a-zA-Z-]{2,8})"#).unwrap());
static NEWLINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Content types the reader refuses to ingest.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    ct == "application/pdf"
        || ct == "application/octet-stream"
        || ct.starts_with("image/")
        || ct.starts_with("video/")
        || ct.starts_with("audio/")
}

/// Convert HTML to readable text: scripts and styles dropped, `<br>` to a
/// newline, `</p>` to a paragraph break, remaining tags stripped, entities
/// decoded, newline runs collapsed.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, "");
    let text = STYLE.replace_all(&text, "");
    let text = BR.replace_all(&text, "\n");
    let text = P_CLOSE.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");

    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    NEWLINE_RUN.replace_all(&text, "\n\n").trim().to_string()
}

/// Pull the `<title>` out of an HTML document.
pub fn extract_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Pull the `lang` attribute off the `<html>` element.
pub fn extract_lang(html: &str) -> Option<String> {
    HTML_LANG
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_scripts_and_styles() {
        let html = "<p>Keep</p><script>alert(1)</script><style>.x{}</style>";
        let text = html_to_text(html);
        assert_eq!(text, "Keep");
    }

    #[test]
    fn br_and_p_become_newlines() {
        let html = "<p>one</p><p>two<br>three</p>";
        let text = html_to_text(html);
        assert_eq!(text, "one\n\ntwo\nthree");
    }

    #[test]
    fn entities_decode() {
        assert_eq!(html_to_text("a &amp; b &lt;c&gt;"), "a & b <c>");
    }

    #[test]
    fn title_and_lang_extraction() {
        let html = r#"<html lang="en-US"><head><title> Page Title </title></head></html>"#;
        assert_eq!(extract_title(html), Some("Page Title".to_string()));
        assert_eq!(extract_lang(html), Some("en-us".to_string()));
        assert_eq!(extract_title("<html></html>"), None);
    }

    #[test]
    fn binary_content_types() {
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("video/mp4; codecs=avc1"));
        assert!(is_binary_content_type("application/octet-stream"));
        assert!(!is_binary_content_type("text/html; charset=utf-8"));
        assert!(!is_binary_content_type("application/json"));
    }
}
