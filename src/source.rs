//! Image source trait and configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{RawResult, Result};

/// How a source obtains its results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Documented REST API.
    #[default]
    Api,
    /// HTML/JSON scraping of a search engine.
    Scraper,
}

/// Quota policy applied to a source for a given overall limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTier {
    /// `ceil(limit / 6)`.
    #[default]
    Baseline,
    /// `ceil(limit * 0.3)`, for scrapers that return many low-yield hits.
    Heavy,
}

impl QuotaTier {
    /// Number of candidates requested from a source of this tier.
    ///
    /// Seven sources share these quotas, so the sum exceeds `limit`.
    pub fn quota(self, limit: usize) -> usize {
        let limit = limit as f64;
        let quota = match self {
            QuotaTier::Baseline => (limit / 6.0).ceil(),
            QuotaTier::Heavy => (limit * 0.3).ceil(),
        };
        quota as usize
    }
}

/// Configuration for an image source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name, also used as the provenance tag on results.
    pub name: String,
    /// Short identifier, used as the result id prefix.
    pub shortcut: String,
    /// API or scraper.
    #[serde(default)]
    pub kind: SourceKind,
    /// Quota policy.
    #[serde(default)]
    pub tier: QuotaTier,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whether the source is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    20
}

fn default_enabled() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            shortcut: String::new(),
            kind: SourceKind::Api,
            tier: QuotaTier::Baseline,
            timeout: 20,
            enabled: true,
        }
    }
}

/// Trait for implementing image sources.
///
/// A source returns an error instead of an empty list when it fails, so the
/// orchestrator can tell "nothing found" apart from "source broken". Both
/// contribute zero candidates to the aggregate.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Returns the source configuration.
    fn config(&self) -> &SourceConfig;

    /// Searches for at most `limit` images matching `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>>;

    /// Returns the source name.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Returns the source shortcut.
    fn shortcut(&self) -> &str {
        &self.config().shortcut
    }

    /// Returns the quota tier.
    fn tier(&self) -> QuotaTier {
        self.config().tier
    }

    /// Returns whether the source is enabled.
    fn is_enabled(&self) -> bool {
        self.config().enabled
    }
}
