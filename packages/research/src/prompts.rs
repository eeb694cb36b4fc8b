//! Prompt builders for the plan, answer, verify and NLI tasks.
//!
//! Each builder returns a `{system, user}` pair. The user side carries the
//! variable content; the system side carries the contract the model must
//! honor (JSON-only for structured tasks, citation discipline for answers).

use crate::types::{ChunkHit, Depth, ResearchRequest, SourceRef};

/// A system/user prompt pair.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

const PLAN_SYSTEM: &str = "You are a research planner. Decompose the question into focused web \
search subqueries. Respond with JSON only, no prose, no code fences:\n\
{\"intent\": \"one sentence\", \"subqueries\": [\"...\"], \"focus\": [\"...\"], \
\"constraints\": {}}";

/// Prompt for the planning stage.
pub fn plan_prompt(request: &ResearchRequest) -> PromptPair {
    let depth_hint = match request.depth {
        Depth::Quick => "Use at most 3 subqueries.",
        Depth::Normal => "Use at most 4 subqueries.",
        Depth::Deep => "Use at most 6 subqueries.",
    };

    let mut constraints = Vec::new();
    if let Some(range) = &request.time_range {
        if let Some(from) = &range.from {
            constraints.push(format!("published after {from}"));
        }
        if let Some(to) = &range.to {
            constraints.push(format!("published before {to}"));
        }
    }
    if let Some(region) = &request.region {
        constraints.push(format!("region: {region}"));
    }
    if !request.allowed_domains.is_empty() {
        constraints.push(format!("restrict to domains: {}", request.allowed_domains.join(", ")));
    }
    let constraints = if constraints.is_empty() {
        String::new()
    } else {
        format!("\nConstraints: {}", constraints.join("; "))
    };

    PromptPair {
        system: PLAN_SYSTEM.to_string(),
        user: format!(
            "Question: {}\n{depth_hint}{constraints}",
            request.question.trim()
        ),
    }
}

const ANSWER_SYSTEM: &str = "You are a research assistant answering strictly from the provided \
sources. Rules:\n\
- Cite every factual statement inline with [n], where n is the source number below.\n\
- Markdown only. No bibliography or reference list; the numbered sources are provided \
separately.\n\
- Do not speculate beyond the source snippets. If the sources do not answer the question, \
say what is missing.";

/// Prompt for the streamed answer stage. `sources` are the minimal refs
/// actually present in `chunks`; `source_index_of` maps a chunk's source to
/// its 1-based citation number.
pub fn answer_prompt(question: &str, sources: &[SourceRef], chunks: &[ChunkHit]) -> PromptPair {
    let mut source_list = String::new();
    for source in sources {
        let title = source.title.as_deref().unwrap_or("(untitled)");
        source_list.push_str(&format!("[{}] {} — {}\n", source.index, title, source.url));
    }

    let index_by_source: std::collections::HashMap<&str, usize> = sources
        .iter()
        .map(|s| (s.id.as_str(), s.index))
        .collect();

    let mut context = String::new();
    for chunk in chunks {
        let n = index_by_source.get(chunk.source_id.as_str()).copied().unwrap_or(0);
        context.push_str(&format!("--- Source [{n}] ---\n{}\n\n", chunk.text));
    }

    PromptPair {
        system: ANSWER_SYSTEM.to_string(),
        user: format!(
            "Question: {question}\n\nSources:\n{source_list}\nContext snippets:\n{context}Answer \
             the question using only this context, with inline [n] citations."
        ),
    }
}

const VERIFY_SYSTEM: &str = "You extract atomic, verifiable claims from an answer and bind each \
to verbatim quotes from the provided snippets. Respond with JSON only, no prose, no code \
fences, matching exactly:\n\
{\"claims\": [{\"text\": \"...\", \"claimType\": \"fact|number|date|quote|other\", \
\"supportScore\": 0.0, \"contradicted\": false, \"uncertaintyReason\": \"optional\", \
\"evidence\": [{\"sourceId\": \"...\", \"chunkId\": \"...\", \"quote\": \"verbatim quote\"}]}]}\n\
Every claim must be atomic (one checkable statement) and quote-backed. Quotes must be copied \
verbatim from a snippet. supportScore is in [0,1].";

/// A snippet handed to the verifier.
#[derive(Debug, Clone)]
pub struct VerifySnippet {
    pub source_id: String,
    pub chunk_id: Option<String>,
    pub text: String,
}

/// Prompt for the verification stage.
pub fn verify_prompt(answer_markdown: &str, snippets: &[VerifySnippet], max_claims: usize) -> PromptPair {
    let mut snippet_block = String::new();
    for snippet in snippets {
        let chunk = snippet.chunk_id.as_deref().unwrap_or("-");
        snippet_block.push_str(&format!(
            "sourceId={} chunkId={}\n{}\n\n",
            snippet.source_id, chunk, snippet.text
        ));
    }

    PromptPair {
        system: VERIFY_SYSTEM.to_string(),
        user: format!(
            "Answer to verify:\n{answer_markdown}\n\nSnippets:\n{snippet_block}Extract at most \
             {max_claims} claims."
        ),
    }
}

const NLI_SYSTEM: &str = "You judge whether two quotes about the same claim agree. Respond with \
JSON only, no code fences: {\"label\": \"entail|contradict|neutral\", \"rationale\": \"one \
sentence\"}";

/// Prompt for one NLI contradiction check.
pub fn nli_prompt(claim: &str, quote_a: &str, quote_b: &str) -> PromptPair {
    PromptPair {
        system: NLI_SYSTEM.to_string(),
        user: format!(
            "Claim: {claim}\n\nQuote A: {quote_a}\n\nQuote B: {quote_b}\n\nDo the quotes agree \
             about the claim?"
        ),
    }
}

const SOURCE_TRUST_SYSTEM: &str = "You rate how trustworthy a web source is for factual \
research. Respond with JSON only, no code fences: {\"trust\": 0.0, \"rationale\": \"one \
sentence\"} where trust is in [0,1] (1 = authoritative primary source).";

/// Prompt for rating a source's trustworthiness.
pub fn source_trust_prompt(url: &str, title: Option<&str>, snippet: Option<&str>) -> PromptPair {
    let title = title.unwrap_or("(untitled)");
    let snippet = snippet.unwrap_or("");
    PromptPair {
        system: SOURCE_TRUST_SYSTEM.to_string(),
        user: format!("URL: {url}\nTitle: {title}\nExcerpt:\n{snippet}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResearchRequest;

    #[test]
    fn plan_prompt_reflects_depth_and_constraints() {
        let mut request = ResearchRequest::new("What changed in the Artemis II schedule?");
        request.depth = Depth::Deep;
        request.allowed_domains = vec!["nasa.gov".into()];
        let pair = plan_prompt(&request);
        assert!(pair.user.contains("at most 6"));
        assert!(pair.user.contains("nasa.gov"));
        assert!(pair.system.contains("JSON only"));
    }

    #[test]
    fn answer_prompt_numbers_sources() {
        let sources = vec![SourceRef {
            id: "s1".into(),
            url: "https://example.com/a".into(),
            title: Some("Example".into()),
            domain: Some("example.com".into()),
            index: 1,
        }];
        let chunks = vec![ChunkHit {
            id: "c1".into(),
            source_id: "s1".into(),
            text: "snippet body".into(),
            score: 0.9,
            bm25: None,
            snippet: None,
        }];
        let pair = answer_prompt("the question", &sources, &chunks);
        assert!(pair.user.contains("[1] Example — https://example.com/a"));
        assert!(pair.user.contains("--- Source [1] ---"));
        assert!(pair.system.contains("[n]"));
        assert!(pair.system.contains("No bibliography"));
    }

    #[test]
    fn verify_prompt_is_json_only() {
        let snippets = vec![VerifySnippet {
            source_id: "s1".into(),
            chunk_id: Some("c1".into()),
            text: "text".into(),
        }];
        let pair = verify_prompt("answer", &snippets, 12);
        assert!(pair.system.contains("JSON only"));
        assert!(pair.system.contains("no code fences"));
        assert!(pair.user.contains("at most 12 claims"));
        assert!(pair.user.contains("sourceId=s1 chunkId=c1"));
    }

    #[test]
    fn nli_prompt_names_both_quotes() {
        let pair = nli_prompt("iron melts at X", "quote a", "quote b");
        assert!(pair.user.contains("Quote A"));
        assert!(pair.user.contains("Quote B"));
        assert!(pair.system.contains("entail|contradict|neutral"));
    }

    #[test]
    fn source_trust_prompt_is_bounded_json() {
        let pair = source_trust_prompt("https://example.com", None, Some("excerpt"));
        assert!(pair.system.contains("[0,1]"));
        assert!(pair.user.contains("(untitled)"));
    }
}
