//! Resilient fetching of remote images and pages.
//!
//! Every fetch validates the target, retries transient failures with capped
//! exponential backoff, bounds each attempt with a hard timeout and switches
//! to a client with relaxed certificate checks for hosts known to ship broken
//! chains. 403, 404 and malformed URLs are never retried.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::Stream;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::{Result, SearchError};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("valid regex"));

/// Host fragments that get the relaxed-TLS client.
const RELAXED_TLS_HINTS: &[&str] = &["museum.", "edu", "gov", "academic"];

/// Trait for fetching the text content of a URL.
///
/// Scraping sources depend on this rather than on a concrete client so they
/// can be tested against canned pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches the body of the given URL as text.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Retry and timeout settings for one kind of fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Hard limit for one attempt to produce response headers.
    pub attempt_timeout: Duration,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
}

impl FetchPolicy {
    /// Interactive image proxying.
    pub fn proxy() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(20),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(4),
        }
    }

    /// Attachment downloads.
    pub fn download() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(45),
            ..Self::proxy()
        }
    }

    /// Search pages fetched by scraping sources.
    pub fn page() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(15),
            ..Self::proxy()
        }
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Sets the backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    /// Doubles each time up to `max_backoff`; never decreases.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::proxy()
    }
}

/// Runs `operation` until it succeeds, fails terminally, or has been tried
/// `policy.max_retries` times.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &FetchPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries.max(1);
    let mut last_error: Option<SearchError> = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                debug!("{} failed terminally on attempt {}: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) => {
                debug!("{} attempt {}/{} failed: {}", label, attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    sleep(policy.backoff_for(attempt)).await;
                }
            }
        }
    }

    let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
    warn!("{} gave up after {} attempts: {}", label, attempts, last_error);
    Err(SearchError::RetriesExhausted {
        attempts,
        last_error,
    })
}

/// Whether `host` should be fetched with relaxed certificate verification.
pub fn needs_relaxed_tls(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    RELAXED_TLS_HINTS.iter().any(|hint| host.contains(hint))
}

/// Checks that a fetch target is an absolute http(s) URL.
pub fn parse_fetch_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if !HTTP_URL.is_match(raw) {
        return Err(SearchError::InvalidUrl(format!("not an http(s) URL: {}", raw)));
    }
    Ok(Url::parse(raw)?)
}

/// A successful image response whose body has not been read yet.
#[derive(Debug)]
pub struct FetchedImage {
    /// Final URL after redirects.
    pub url: String,
    /// `Content-Type`, always `image/*`.
    pub content_type: String,
    /// `Content-Length` when the upstream sent one.
    pub content_length: Option<u64>,
    response: Response,
}

impl FetchedImage {
    /// Streams the body.
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        self.response.bytes_stream()
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        self.response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else {
                e.into()
            }
        })
    }
}

/// Fetch layer shared by the image proxy, downloads and scraping sources.
#[derive(Debug, Clone)]
pub struct ResilientFetcher {
    strict: Client,
    relaxed: Client,
    page_policy: FetchPolicy,
}

impl ResilientFetcher {
    /// Creates a fetcher with its own strict and relaxed clients.
    pub fn new() -> Result<Self> {
        let strict = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()?;
        let relaxed = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self::with_clients(strict, relaxed))
    }

    /// Creates a fetcher from existing clients.
    pub fn with_clients(strict: Client, relaxed: Client) -> Self {
        Self {
            strict,
            relaxed,
            page_policy: FetchPolicy::page(),
        }
    }

    /// Sets the policy used by [`PageFetcher::fetch`].
    pub fn with_page_policy(mut self, policy: FetchPolicy) -> Self {
        self.page_policy = policy;
        self
    }

    fn client_for(&self, url: &Url) -> &Client {
        match url.host_str() {
            Some(host) if needs_relaxed_tls(host) => {
                debug!("Using relaxed TLS client for {}", host);
                &self.relaxed
            }
            _ => &self.strict,
        }
    }

    /// One attempt: send, check status and, for images, the content type.
    async fn open(&self, url: &Url, policy: &FetchPolicy, want_image: bool) -> Result<Response> {
        let accept = if want_image {
            "image/avif,image/webp,image/*,*/*;q=0.8"
        } else {
            "text/html,application/json,*/*;q=0.8"
        };
        // The request timeout also bounds the body read after headers arrive.
        let request = self
            .client_for(url)
            .get(url.clone())
            .header(ACCEPT, accept)
            .timeout(policy.attempt_timeout);

        let response = match timeout(policy.attempt_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(SearchError::Timeout),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(SearchError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::UpstreamStatus(status.as_u16()));
        }

        if want_image {
            let content_type = content_type_of(&response);
            if !content_type.to_ascii_lowercase().starts_with("image/") {
                return Err(SearchError::NotAnImage(content_type));
            }
        }

        Ok(response)
    }

    /// Fetches an image, retrying per `policy`.
    pub async fn fetch_image(&self, url: &str, policy: &FetchPolicy) -> Result<FetchedImage> {
        let url = &parse_fetch_url(url)?;
        let response =
            retry_with_policy(policy, url.as_str(), || self.open(url, policy, true)).await?;

        Ok(FetchedImage {
            url: response.url().to_string(),
            content_type: content_type_of(&response),
            content_length: response.content_length(),
            response,
        })
    }

    /// Fetches a page as text, retrying per `policy`.
    pub async fn fetch_page(&self, url: &str, policy: &FetchPolicy) -> Result<String> {
        let url = &parse_fetch_url(url)?;
        retry_with_policy(policy, url.as_str(), || async move {
            let response = self.open(url, policy, false).await?;
            match timeout(policy.attempt_timeout, response.text()).await {
                Ok(text) => Ok(text?),
                Err(_) => Err(SearchError::Timeout),
            }
        })
        .await
    }
}

#[async_trait]
impl PageFetcher for ResilientFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetch_page(url, &self.page_policy).await
    }
}

fn content_type_of(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// File extension for an image content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "img",
    }
}

/// Reduces a title to a safe attachment file name stem.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::new();
    let mut last_dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    let out: String = out.trim_end_matches('-').chars().take(100).collect();
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() {
        "image".to_string()
    } else {
        out
    }
}
