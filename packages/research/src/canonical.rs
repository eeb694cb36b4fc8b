//! URL canonicalization.
//!
//! Sources are deduplicated on their canonical URL: lowercased scheme and
//! host, no fragment, tracking parameters dropped, remaining query params
//! sorted, trailing slash trimmed except at the root.

use url::Url;

use crate::error::{ReadError, ResearchError};

/// Query parameters stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "mc_cid", "mc_eid", "ref", "ref_src"];

/// Canonicalize a URL string. Idempotent.
pub fn canonicalize_url(raw: &str) -> Result<String, ResearchError> {
    let url = parse_with_default_scheme(raw).ok_or_else(|| ResearchError::InvalidUrl {
        url: raw.to_string(),
    })?;
    Ok(canonical_form(&url))
}

/// Parse a URL, defaulting to https when the scheme is missing.
pub fn parse_with_default_scheme(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) if url.has_host() => Some(url),
        _ => Url::parse(&format!("https://{trimmed}")).ok().filter(Url::has_host),
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn canonical_form(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let mut path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut out = format!("{scheme}://{host}");
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(&path);

    if !params.is_empty() {
        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", encode_component(k), encode_component(v))
                }
            })
            .collect();
        out.push('?');
        out.push_str(&query.join("&"));
    }

    out
}

fn encode_component(s: &str) -> String {
    // Keep unreserved characters; percent-encode the rest.
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Extract the lowercased host of a canonical URL.
pub fn domain_of(canonical: &str) -> Option<String> {
    Url::parse(canonical)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Hostname suffix match used by domain allow/deny filters:
/// "example.com" matches "example.com" and "news.example.com".
pub fn host_matches(host: &str, filter: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let filter = filter.trim().to_ascii_lowercase();
    if filter.is_empty() {
        return false;
    }
    host == filter || host.ends_with(&format!(".{filter}"))
}

/// Normalize a URL for fetching: canonical form is not required, but a
/// scheme is.
pub fn normalize_for_fetch(raw: &str) -> Result<Url, ReadError> {
    parse_with_default_scheme(raw).ok_or_else(|| ReadError::InvalidUrl {
        url: raw.to_string(),
    })
}
