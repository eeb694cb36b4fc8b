//! Page reading: URL to cleaned text.
//!
//! The reader prefers an external readability service when one is
//! configured, falling back to a raw fetch with its own HTML-to-text pass.
//! A rate-limit signal from the readability service pauses it process-wide
//! for a cooldown window; raw fetches keep working in the meantime.

pub mod html;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::canonical::normalize_for_fetch;
use crate::error::ReadError;
use crate::secret::SecretKey;

/// How long the primary reader stays paused after a rate-limit signal.
const COOLDOWN: Duration = Duration::from_secs(45);

/// Which fetch path produced the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    Primary,
    Raw,
}

/// Which path the caller prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderPreference {
    #[default]
    Primary,
    Raw,
}

impl ReaderPreference {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => ReaderPreference::Raw,
            _ => ReaderPreference::Primary,
        }
    }
}

/// A fetched and cleaned page.
#[derive(Debug, Clone)]
pub struct ReadPage {
    pub text: String,
    pub html: Option<String>,
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub lang: Option<String>,
    pub content_type: Option<String>,
    pub http_status: Option<u16>,
    pub from: ReadFrom,
}

/// Options for a single read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
    pub prefer: ReaderPreference,
    pub cancel: CancellationToken,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::util::REQUEST_TIMEOUT_MS),
            max_bytes: 2 * 1024 * 1024,
            prefer: ReaderPreference::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Seam for page reading so the pipeline can run against mocks.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn read(&self, url: &str, opts: &ReadOptions) -> Result<ReadPage, ReadError>;
}

/// Process-wide pause marker for the primary reader.
#[derive(Clone, Default)]
pub struct Cooldown(Arc<AtomicU64>);

impl Cooldown {
    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Pause the primary reader. Atomic store; no lock needed.
    pub fn pause_for(&self, duration: Duration) {
        self.0
            .store(Self::now_ms() + duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the pause window is still open.
    pub fn active(&self) -> bool {
        Self::now_ms() < self.0.load(Ordering::Relaxed)
    }
}

/// Configuration of the external readability service.
#[derive(Debug, Clone)]
pub struct PrimaryReaderConfig {
    /// Base URL; the target URL is appended as a path.
    pub base_url: String,
    pub api_key: Option<SecretKey>,
}

/// HTTP reader: primary readability service with raw-fetch fallback.
pub struct HttpReader {
    client: reqwest::Client,
    primary: Option<PrimaryReaderConfig>,
    cooldown: Cooldown,
    /// Hosts that always take the raw path (suffix-matched).
    raw_domains: Vec<String>,
    user_agent: String,
}

impl HttpReader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            primary: None,
            cooldown: Cooldown::default(),
            raw_domains: Vec::new(),
            user_agent: "research-bot/0.1".to_string(),
        }
    }

    /// Configure the readability service.
    pub fn with_primary(mut self, config: PrimaryReaderConfig) -> Self {
        self.primary = Some(config);
        self
    }

    /// Hosts that skip the primary reader.
    pub fn with_raw_domains(mut self, domains: Vec<String>) -> Self {
        self.raw_domains = domains;
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Shared cooldown marker, for observability and tests.
    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn wants_raw(&self, host: &str) -> bool {
        self.raw_domains
            .iter()
            .any(|d| crate::canonical::host_matches(host, d))
    }

    async fn read_primary(
        &self,
        config: &PrimaryReaderConfig,
        url: &url::Url,
        opts: &ReadOptions,
    ) -> Result<ReadPage, ReadError> {
        let endpoint = format!("{}/{}", config.base_url.trim_end_matches('/'), url);
        let mut request = self.client.get(&endpoint).header("Accept", "text/plain");
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = run_with_deadline(opts, request.send()).await?
            .map_err(|e| ReadError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            self.cooldown.pause_for(COOLDOWN);
            warn!(url = %url, "primary reader rate limited; cooling down");
            return Err(ReadError::Status {
                status: 429,
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ReadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = read_capped_body(response, opts, url.as_str()).await?;
        Ok(ReadPage {
            text,
            html: None,
            final_url: Some(url.to_string()),
            title: None,
            lang: None,
            content_type: Some("text/plain".to_string()),
            http_status: Some(status.as_u16()),
            from: ReadFrom::Primary,
        })
    }

    async fn read_raw(&self, url: &url::Url, opts: &ReadOptions) -> Result<ReadPage, ReadError> {
        debug!(url = %url, "raw fetch");
        let response = run_with_deadline(
            opts,
            self.client
                .get(url.as_str())
                .header("User-Agent", &self.user_agent)
                .send(),
        )
        .await?
        .map_err(|e| ReadError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = &content_type {
            if html::is_binary_content_type(ct) {
                return Err(ReadError::BinaryContent {
                    content_type: ct.clone(),
                    url: url.to_string(),
                });
            }
        }

        let body = read_capped_body(response, opts, url.as_str()).await?;

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("html"))
            .unwrap_or_else(|| body.trim_start().starts_with('<'));

        let (text, title, lang, raw_html) = if is_html {
            (
                html::html_to_text(&body),
                html::extract_title(&body),
                html::extract_lang(&body),
                Some(body),
            )
        } else {
            (body, None, None, None)
        };

        Ok(ReadPage {
            text,
            html: raw_html,
            final_url: Some(final_url),
            title,
            lang,
            content_type,
            http_status: Some(status.as_u16()),
            from: ReadFrom::Raw,
        })
    }
}

impl Default for HttpReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reader for HttpReader {
    async fn read(&self, url: &str, opts: &ReadOptions) -> Result<ReadPage, ReadError> {
        let url = normalize_for_fetch(url)?;
        let host = url.host_str().unwrap_or("").to_string();

        let use_primary = matches!(opts.prefer, ReaderPreference::Primary)
            && !self.cooldown.active()
            && !self.wants_raw(&host);

        if use_primary {
            if let Some(config) = &self.primary {
                match self.read_primary(config, &url, opts).await {
                    Ok(page) => return Ok(page),
                    Err(err) if err.is_terminal() => return Err(err),
                    Err(err) => {
                        debug!(url = %url, error = %err, "primary reader failed; falling back to raw");
                    }
                }
            }
        }

        self.read_raw(&url, opts).await
    }
}

/// Await a future under the read's timeout and cancellation. Timeouts are
/// typed as cancellation for the caller.
async fn run_with_deadline<T>(
    opts: &ReadOptions,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, ReadError> {
    tokio::select! {
        biased;
        _ = opts.cancel.cancelled() => Err(ReadError::Cancelled),
        _ = tokio::time::sleep(opts.timeout) => Err(ReadError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Stream-read a response body, aborting once the byte cap is exceeded.
async fn read_capped_body(
    response: reqwest::Response,
    opts: &ReadOptions,
    url: &str,
) -> Result<String, ReadError> {
    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let next = run_with_deadline(opts, stream.next()).await?;
        match next {
            Some(Ok(bytes)) => {
                if buf.len() + bytes.len() > opts.max_bytes {
                    return Err(ReadError::TooLarge {
                        max_bytes: opts.max_bytes,
                        url: url.to_string(),
                    });
                }
                buf.extend_from_slice(&bytes);
            }
            Some(Err(e)) => return Err(ReadError::Http(e.to_string())),
            None => break,
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
