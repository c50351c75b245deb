//! Error types for the image search library.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search, fetch and token operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Operation exceeded its deadline.
    #[error("Search timeout exceeded")]
    Timeout,

    /// No sources registered.
    #[error("No image sources configured")]
    NoSources,

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// URL rejected by scheme/host validation.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A source needs an API key that was not configured.
    #[error("Missing credentials for {0}")]
    MissingCredentials(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    /// Upstream answered with something other than an image.
    #[error("Upstream content is not an image: {0}")]
    NotAnImage(String),

    /// Every fetch attempt failed.
    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Opaque token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Remote site served a bot-block or CAPTCHA page.
    #[error("Blocked by {0}")]
    Blocked(String),

    /// Configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Whether a fetch that failed with this error is worth another attempt.
    ///
    /// 403/404 responses and malformed URLs are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::UpstreamStatus(status) => !matches!(status, 403 | 404),
            SearchError::Http(e) => !e.is_builder(),
            SearchError::InvalidUrl(_)
            | SearchError::UrlParse(_)
            | SearchError::InvalidToken(_)
            | SearchError::Config(_)
            | SearchError::MissingCredentials(_) => false,
            _ => true,
        }
    }
}
