//! Configuration loaded from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use research::reader::ReaderPreference;
use research::PipelineConfig;
use std::env;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Required: key for the LLM provider.
    pub llm_api_key: String,
    pub llm_base_url: Option<String>,
    /// Search provider key; search degrades to empty results without it.
    pub search_api_key: Option<String>,
    /// Readability service, e.g. "https://r.jina.ai".
    pub reader_base_url: Option<String>,
    pub reader_api_key: Option<String>,
    pub reader_raw_domains: Vec<String>,
    /// Cross-encoder rerank backend.
    pub rerank_base_url: Option<String>,
    pub rerank_api_key: Option<String>,
    pub rerank_model: String,
    pub pipeline: PipelineConfig,
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load from the environment (and `.env` in development).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let pipeline = PipelineConfig {
            inline_cap: env_usize("MAX_SOURCES_INLINE", 12).clamp(1, 24),
            request_timeout: Duration::from_millis(
                env_usize("REQUEST_TIMEOUT_MS", 30_000) as u64,
            ),
            reader_prefer: ReaderPreference::parse(
                &env::var("READER_PREFER").unwrap_or_default(),
            ),
            enable_rerank: env_bool("ENABLE_RERANK", false),
            read_concurrency: env_usize("READER_CONCURRENCY", 3).clamp(1, 4),
            answer_budget_tokens: env_usize("ANSWER_INPUT_BUDGET_TOKENS", 3200),
            answer_overhead_tokens: env_usize("ANSWER_PROMPT_OVERHEAD_TOKENS", 800),
            max_chars_per_chunk: env_usize("ANSWER_MAX_CHARS_PER_CHUNK", 900),
            verify_budget_tokens: env_usize("VERIFY_INPUT_BUDGET_TOKENS", 1500),
            verify_overhead_tokens: env_usize("VERIFY_PROMPT_OVERHEAD_TOKENS", 500),
            skip_verify_on_tpm: env_bool("SKIP_VERIFY_ON_TPM", true),
            ..PipelineConfig::default()
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://research.db".to_string()),
            llm_api_key: env::var("LLM_API_KEY").context("LLM_API_KEY must be set")?,
            llm_base_url: env::var("LLM_BASE_URL").ok(),
            search_api_key: env::var("TAVILY_API_KEY").ok(),
            reader_base_url: env::var("READER_BASE_URL").ok(),
            reader_api_key: env::var("READER_API_KEY").ok(),
            reader_raw_domains: env::var("READER_RAW_DOMAINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rerank_base_url: env::var("RERANK_BASE_URL").ok(),
            rerank_api_key: env::var("RERANK_API_KEY").ok(),
            rerank_model: env::var("RERANK_MODEL")
                .unwrap_or_else(|_| "rerank-lite-1".to_string()),
            pipeline,
        })
    }

    /// Log which provider keys are configured, with values masked.
    pub fn log_masked(&self) {
        fn mask(name: &str, value: Option<&str>) {
            match value {
                Some(v) if !v.is_empty() => {
                    let shown: String = v.chars().take(4).collect();
                    tracing::info!(
                        "  {name}: {shown}{}",
                        "*".repeat(v.chars().count().saturating_sub(4))
                    );
                }
                _ => tracing::warn!("  {name}: NOT SET"),
            }
        }
        tracing::info!("Provider configuration:");
        mask("LLM_API_KEY", Some(&self.llm_api_key));
        mask("TAVILY_API_KEY", self.search_api_key.as_deref());
        mask("READER_API_KEY", self.reader_api_key.as_deref());
        mask("RERANK_API_KEY", self.rerank_api_key.as_deref());
    }
}
