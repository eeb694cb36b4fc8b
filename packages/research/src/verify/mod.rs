//! Claim extraction and verification.
//!
//! The verifier turns a finished answer into atomic claims bound to
//! verbatim quotes. LLM JSON is parsed tolerantly, validated against the
//! active ranking context, and quote offsets are resolved with the tolerant
//! matcher. An optional NLI pass flags contradictions between sources.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::{Llm, LlmRequest};
use crate::prompts::{nli_prompt, verify_prompt, VerifySnippet};
use crate::text::{find_quote_offsets, QuoteMatchOptions};
use crate::types::{VerifiedClaim, VerifiedEvidence};
use llm_client::ModelAlias;

/// Support-score penalty applied when a contradiction is found.
const CONTRADICTION_PENALTY: f64 = 0.15;

/// Options for one verification pass.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub max_claims: usize,
    pub bind_offsets: bool,
    pub nli_contradiction_check: bool,
    pub nli_max_pairs_per_claim: usize,
    pub cancel: CancellationToken,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_claims: 12,
            bind_offsets: true,
            nli_contradiction_check: false,
            nli_max_pairs_per_claim: 2,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawVerifyResponse {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClaim {
    #[serde(default)]
    text: String,
    #[serde(default)]
    claim_type: Option<String>,
    #[serde(default)]
    support_score: Option<f64>,
    #[serde(default)]
    contradicted: bool,
    #[serde(default)]
    uncertainty_reason: Option<String>,
    #[serde(default)]
    evidence: Vec<RawEvidence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvidence {
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    chunk_id: Option<String>,
    #[serde(default)]
    quote: String,
}

#[derive(Debug, Deserialize)]
struct NliVerdict {
    #[serde(default)]
    label: String,
    #[serde(default)]
    rationale: String,
}

/// Extract and verify claims for an answer against its snippets.
pub async fn verify(
    llm: &dyn Llm,
    answer_markdown: &str,
    snippets: &[VerifySnippet],
    chunk_text_by_id: &HashMap<String, String>,
    opts: &VerifyOptions,
) -> Result<Vec<VerifiedClaim>> {
    if answer_markdown.trim().is_empty() || snippets.is_empty() {
        return Ok(Vec::new());
    }

    let pair = verify_prompt(answer_markdown, snippets, opts.max_claims);
    let raw = llm
        .generate(
            LlmRequest::new(ModelAlias::Verify, pair.user)
                .with_system(pair.system)
                .with_cancel(opts.cancel.clone()),
        )
        .await?;

    let parsed: RawVerifyResponse = match tolerant_json(&raw) {
        Some(parsed) => parsed,
        None => {
            warn!("verifier output was not parseable JSON; returning no claims");
            return Ok(Vec::new());
        }
    };

    let known_sources: HashSet<&str> = snippets.iter().map(|s| s.source_id.as_str()).collect();
    let known_chunks: HashSet<&str> = snippets
        .iter()
        .filter_map(|s| s.chunk_id.as_deref())
        .collect();

    let mut claims: Vec<VerifiedClaim> = parsed
        .claims
        .into_iter()
        .take(opts.max_claims)
        .filter_map(|claim| {
            validate_claim(claim, &known_sources, &known_chunks)
        })
        .collect();

    if opts.bind_offsets {
        for claim in &mut claims {
            for evidence in &mut claim.evidence {
                bind_evidence_offsets(evidence, snippets, chunk_text_by_id);
            }
        }
    }

    if opts.nli_contradiction_check {
        for claim in &mut claims {
            check_contradictions(llm, claim, opts).await?;
        }
    }

    Ok(claims)
}

/// Schema-validate one raw claim, dropping malformed evidence. Claims with
/// no surviving evidence are dropped entirely.
fn validate_claim(
    raw: RawClaim,
    known_sources: &HashSet<&str>,
    known_chunks: &HashSet<&str>,
) -> Option<VerifiedClaim> {
    let text = raw.text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let evidence: Vec<VerifiedEvidence> = raw
        .evidence
        .into_iter()
        .filter_map(|ev| {
            if ev.quote.trim().is_empty() || !known_sources.contains(ev.source_id.as_str()) {
                return None;
            }
            // A chunk id outside the ranking context invalidates the
            // evidence; a missing chunk id is admitted (bound later when
            // the quote resolves).
            let chunk_id = match ev.chunk_id {
                Some(id) if known_chunks.contains(id.as_str()) => Some(id),
                Some(_) => return None,
                None => None,
            };
            Some(VerifiedEvidence {
                source_id: ev.source_id,
                chunk_id,
                quote: ev.quote,
                char_start: None,
                char_end: None,
            })
        })
        .collect();

    if evidence.is_empty() {
        debug!(claim = %text, "dropping claim with no valid evidence");
        return None;
    }

    Some(VerifiedClaim {
        text,
        claim_type: raw.claim_type,
        support_score: raw.support_score.unwrap_or(0.5).clamp(0.0, 1.0),
        contradicted: raw.contradicted,
        uncertainty_reason: raw.uncertainty_reason,
        evidence,
    })
}

/// Resolve quote offsets inside the evidence's chunk. Evidence without a
/// chunk id tries every snippet of its source and adopts the first chunk
/// whose text contains the quote.
fn bind_evidence_offsets(
    evidence: &mut VerifiedEvidence,
    snippets: &[VerifySnippet],
    chunk_text_by_id: &HashMap<String, String>,
) {
    let match_opts = QuoteMatchOptions::default();

    if let Some(chunk_id) = &evidence.chunk_id {
        let text = chunk_text_by_id
            .get(chunk_id)
            .map(String::as_str)
            .or_else(|| {
                snippets
                    .iter()
                    .find(|s| s.chunk_id.as_deref() == Some(chunk_id))
                    .map(|s| s.text.as_str())
            });
        if let Some(text) = text {
            if let Some((start, end)) = find_quote_offsets(text, &evidence.quote, &match_opts) {
                evidence.char_start = Some(start);
                evidence.char_end = Some(end);
            }
        }
        return;
    }

    for snippet in snippets.iter().filter(|s| s.source_id == evidence.source_id) {
        let Some(chunk_id) = &snippet.chunk_id else {
            continue;
        };
        let text = chunk_text_by_id
            .get(chunk_id)
            .map(String::as_str)
            .unwrap_or(snippet.text.as_str());
        if let Some((start, end)) = find_quote_offsets(text, &evidence.quote, &match_opts) {
            evidence.chunk_id = Some(chunk_id.clone());
            evidence.char_start = Some(start);
            evidence.char_end = Some(end);
            return;
        }
    }
}

/// Pairwise NLI over evidence from different sources. Any "contradict"
/// verdict marks the claim and shaves its support score.
async fn check_contradictions(
    llm: &dyn Llm,
    claim: &mut VerifiedClaim,
    opts: &VerifyOptions,
) -> Result<()> {
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..claim.evidence.len() {
        for j in (i + 1)..claim.evidence.len() {
            if claim.evidence[i].source_id != claim.evidence[j].source_id {
                pairs.push((i, j));
            }
        }
    }
    pairs.truncate(opts.nli_max_pairs_per_claim);

    for (i, j) in pairs {
        let pair = nli_prompt(&claim.text, &claim.evidence[i].quote, &claim.evidence[j].quote);
        let raw = llm
            .generate(
                LlmRequest::new(ModelAlias::Verify, pair.user)
                    .with_system(pair.system)
                    .with_cancel(opts.cancel.clone()),
            )
            .await?;

        let Some(verdict) = tolerant_json::<NliVerdict>(&raw) else {
            continue;
        };
        if verdict.label.eq_ignore_ascii_case("contradict") {
            claim.contradicted = true;
            claim.support_score = (claim.support_score - CONTRADICTION_PENALTY).clamp(0.0, 1.0);
            if claim.uncertainty_reason.as_deref().unwrap_or("").is_empty() {
                claim.uncertainty_reason = Some(verdict.rationale);
            }
        }
    }
    Ok(())
}

/// Parse LLM JSON tolerantly: strip code fences, then try the raw text,
/// then the largest `{…}` substring.
pub fn tolerant_json<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    let trimmed = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") and the closing fence.
    let inner = inner.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    inner.trim().strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;

    fn snippet(source: &str, chunk: &str, text: &str) -> VerifySnippet {
        VerifySnippet {
            source_id: source.into(),
            chunk_id: Some(chunk.into()),
            text: text.into(),
        }
    }

    fn claims_json(evidence: &str) -> String {
        format!(
            r#"{{"claims":[{{"text":"Iron's Curie temperature is 770 °C.","claimType":"number","supportScore":0.9,"contradicted":false,"evidence":[{evidence}]}}]}}"#
        )
    }

    #[tokio::test]
    async fn binds_offsets_with_tolerant_matching() {
        let chunk_text = "The Curie temperature of iron is 770 °C at standard pressure.";
        let llm = MockLlm::new().with_text(
            ModelAlias::Verify,
            claims_json(
                r#"{"sourceId":"s1","chunkId":"c1","quote":"Curie temperature of iron is 770°C"}"#,
            ),
        );
        let snippets = vec![snippet("s1", "c1", chunk_text)];
        let mut chunk_texts = HashMap::new();
        chunk_texts.insert("c1".to_string(), chunk_text.to_string());

        let claims = verify(&llm, "answer [1]", &snippets, &chunk_texts, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        let evidence = &claims[0].evidence[0];
        let start = evidence.char_start.unwrap();
        let end = evidence.char_end.unwrap();
        assert_eq!(start, chunk_text.find("Curie").unwrap());
        assert_eq!(&chunk_text[start..end], "Curie temperature of iron is 770 °C");
    }

    #[tokio::test]
    async fn drops_evidence_outside_ranking_context() {
        let llm = MockLlm::new().with_text(
            ModelAlias::Verify,
            claims_json(
                r#"{"sourceId":"unknown","chunkId":"c1","quote":"x"},
                   {"sourceId":"s1","chunkId":"other-chunk","quote":"x"}"#,
            ),
        );
        let snippets = vec![snippet("s1", "c1", "some text")];
        let claims = verify(&llm, "answer", &snippets, &HashMap::new(), &VerifyOptions::default())
            .await
            .unwrap();
        assert!(claims.is_empty(), "claim with no valid evidence is dropped");
    }

    #[tokio::test]
    async fn evidence_without_chunk_id_is_bound_to_a_matching_chunk() {
        let chunk_text = "Launch is planned for September 2025, officials said.";
        let llm = MockLlm::new().with_text(
            ModelAlias::Verify,
            claims_json(r#"{"sourceId":"s1","quote":"planned for September 2025"}"#),
        );
        let snippets = vec![snippet("s1", "c1", chunk_text)];
        let mut chunk_texts = HashMap::new();
        chunk_texts.insert("c1".to_string(), chunk_text.to_string());

        let claims = verify(&llm, "answer", &snippets, &chunk_texts, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].evidence[0].chunk_id.as_deref(), Some("c1"));
        assert!(claims[0].evidence[0].char_start.is_some());
    }

    #[tokio::test]
    async fn unparseable_output_yields_no_claims() {
        let llm = MockLlm::new().with_text(ModelAlias::Verify, "I am not JSON at all");
        let snippets = vec![snippet("s1", "c1", "text")];
        let claims = verify(&llm, "answer", &snippets, &HashMap::new(), &VerifyOptions::default())
            .await
            .unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn code_fenced_json_still_parses() {
        let fenced = format!(
            "```json\n{}\n```",
            claims_json(r#"{"sourceId":"s1","chunkId":"c1","quote":"some text"}"#)
        );
        let llm = MockLlm::new().with_text(ModelAlias::Verify, fenced);
        let snippets = vec![snippet("s1", "c1", "some text here")];
        let claims = verify(&llm, "answer", &snippets, &HashMap::new(), &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
    }

    #[tokio::test]
    async fn nli_contradiction_marks_claim_and_reduces_support() {
        let verify_json = r#"{"claims":[{"text":"The launch date is fixed.","supportScore":0.8,"contradicted":false,"evidence":[
            {"sourceId":"s1","chunkId":"c1","quote":"launch in March"},
            {"sourceId":"s2","chunkId":"c2","quote":"launch delayed to June"}]}]}"#;
        let llm = MockLlm::new()
            .with_text(ModelAlias::Verify, verify_json)
            .with_text(
                ModelAlias::Verify,
                r#"{"label":"contradict","rationale":"dates disagree"}"#,
            );
        let snippets = vec![
            snippet("s1", "c1", "launch in March"),
            snippet("s2", "c2", "launch delayed to June"),
        ];
        let opts = VerifyOptions {
            nli_contradiction_check: true,
            ..Default::default()
        };
        let claims = verify(&llm, "answer", &snippets, &HashMap::new(), &opts)
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert!(claims[0].contradicted);
        assert!((claims[0].support_score - 0.65).abs() < 1e-9);
        assert_eq!(claims[0].uncertainty_reason.as_deref(), Some("dates disagree"));
    }

    #[test]
    fn tolerant_json_extracts_largest_brace_block() {
        let raw = "Here is the result: {\"claims\": []} hope that helps!";
        let parsed: RawVerifyResponse = tolerant_json(raw).unwrap();
        assert!(parsed.claims.is_empty());
    }

    #[test]
    fn support_scores_are_clamped() {
        let raw = RawClaim {
            text: "t".into(),
            claim_type: None,
            support_score: Some(3.0),
            contradicted: false,
            uncertainty_reason: None,
            evidence: vec![RawEvidence {
                source_id: "s1".into(),
                chunk_id: None,
                quote: "q".into(),
            }],
        };
        let mut sources = HashSet::new();
        sources.insert("s1");
        let claim = validate_claim(raw, &sources, &HashSet::new()).unwrap();
        assert_eq!(claim.support_score, 1.0);
    }
}
