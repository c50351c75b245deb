//! DuckDuckGo Images scraper.
//!
//! Image search is a two-step flow: the HTML search page issues a `vqd`
//! token, which the `i.js` JSON endpoint then requires.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::fetcher::PageFetcher;
use crate::{QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind};

static VQD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"vqd\s*[=:]\s*["']?([\d-]+)["']?"#).expect("valid regex"));

/// DuckDuckGo image search.
pub struct DuckDuckGoImages {
    config: SourceConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl DuckDuckGoImages {
    /// Creates a new DuckDuckGo Images source with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: SourceConfig {
                name: "DuckDuckGo Images".to_string(),
                shortcut: "ddgimg".to_string(),
                kind: SourceKind::Scraper,
                tier: QuotaTier::Baseline,
                timeout: 20,
                enabled: true,
            },
            fetcher,
        }
    }

    /// Creates with custom configuration.
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }
}

/// Extracts the `vqd` search token from the landing page.
fn extract_vqd(html: &str) -> Option<String> {
    VQD.captures(html).map(|c| c[1].to_string())
}

#[derive(Deserialize)]
struct DdgResponse {
    #[serde(default)]
    results: Vec<DdgImage>,
}

#[derive(Deserialize)]
struct DdgImage {
    image: Option<String>,
    #[serde(default)]
    title: String,
    url: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

impl DuckDuckGoImages {
    fn parse_results(&self, body: &str) -> Result<Vec<RawResult>> {
        let response: DdgResponse =
            serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(response
            .results
            .into_iter()
            .filter_map(|item| {
                let image = item.image.filter(|u| !u.is_empty())?;
                let mut raw = RawResult::new(image, item.title.trim(), self.name())
                    .with_dimensions(item.width, item.height);
                if let Some(page) = item.url {
                    raw = raw.with_source_page(page);
                }
                Some(raw)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for DuckDuckGoImages {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let encoded = urlencoding::encode(query);
        let landing = format!("https://duckduckgo.com/?q={}&iax=images&ia=images", encoded);
        let html = self.fetcher.fetch(&landing).await?;

        let vqd = extract_vqd(&html).ok_or_else(|| {
            SearchError::Blocked("DuckDuckGo did not issue a search token".to_string())
        })?;

        let api = format!(
            "https://duckduckgo.com/i.js?l=us-en&o=json&q={}&vqd={}&f=,,,,,&p=1",
            encoded, vqd
        );
        let body = self.fetcher.fetch(&api).await?;

        let mut results = self.parse_results(&body)?;
        results.truncate(limit);
        Ok(results)
    }
}
