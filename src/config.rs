//! Application configuration.
//!
//! Everything the orchestrator, the token codec and the HTTP server need is
//! carried in one [`AppConfig`] value that callers build and pass in.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{Result, SearchError};

/// Secret used when none is configured. Only suitable for local development.
pub const DEVELOPMENT_SECRET: &str = "a3s-image-search-development-secret";

/// API keys for the REST sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Unsplash access key.
    pub unsplash: Option<String>,
    /// Pexels API key.
    pub pexels: Option<String>,
    /// Pixabay API key.
    pub pixabay: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider credentials.
    #[serde(default)]
    pub api_keys: ApiKeys,
    /// Secret the opaque token key is derived from.
    #[serde(default = "default_secret")]
    pub token_secret: String,
    /// Sources whose images win a merge regardless of resolution.
    #[serde(default = "default_premium_sources")]
    pub premium_sources: Vec<String>,
    /// Upper bound for a single source search, in seconds.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    /// Hide internal error detail from HTTP clients.
    #[serde(default)]
    pub production: bool,
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Result limit used when a request does not give one.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_secret() -> String {
    DEVELOPMENT_SECRET.to_string()
}

fn default_premium_sources() -> Vec<String> {
    vec!["Unsplash".to_string(), "Pexels".to_string()]
}

fn default_source_timeout() -> u64 {
    30
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_limit() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_keys: ApiKeys::default(),
            token_secret: default_secret(),
            premium_sources: default_premium_sources(),
            source_timeout_secs: default_source_timeout(),
            production: false,
            bind: default_bind(),
            default_limit: default_limit(),
        }
    }
}

impl AppConfig {
    /// Checks the configuration for values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.token_secret.is_empty() {
            return Err(SearchError::Config("token secret must not be empty".into()));
        }
        if self.source_timeout_secs == 0 {
            return Err(SearchError::Config(
                "source timeout must be at least one second".into(),
            ));
        }
        if self.default_limit == 0 {
            return Err(SearchError::Config("default limit must be positive".into()));
        }
        Ok(())
    }

    /// Whether the built-in development secret is in use.
    pub fn uses_development_secret(&self) -> bool {
        self.token_secret == DEVELOPMENT_SECRET
    }

    /// Whether `source` belongs to the premium tier.
    pub fn is_premium(&self, source: &str) -> bool {
        self.premium_sources.iter().any(|s| s == source)
    }
}
