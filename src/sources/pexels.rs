//! Pexels source using the official search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Copyright, QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind,
};

const MAX_PER_PAGE: usize = 80;

/// Pexels photo search.
pub struct Pexels {
    config: SourceConfig,
    client: Client,
    api_key: Option<String>,
}

impl Pexels {
    /// Creates a new Pexels source.
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            config: SourceConfig {
                name: "Pexels".to_string(),
                shortcut: "pexels".to_string(),
                kind: SourceKind::Api,
                tier: QuotaTier::Baseline,
                timeout: 15,
                enabled: true,
            },
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Creates with custom configuration.
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Deserialize)]
struct PexelsPhoto {
    id: u64,
    width: u32,
    height: u32,
    url: Option<String>,
    photographer: Option<String>,
    alt: Option<String>,
    src: PexelsSrc,
}

#[derive(Deserialize)]
struct PexelsSrc {
    original: Option<String>,
    large2x: Option<String>,
}

impl Pexels {
    fn parse_results(&self, body: &str) -> Result<Vec<RawResult>> {
        let response: PexelsResponse =
            serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(response
            .photos
            .into_iter()
            .filter_map(|photo| {
                let image_url = photo.src.original.or(photo.src.large2x)?;
                let title = photo
                    .alt
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| "Pexels photo".to_string());

                let mut raw = RawResult::new(image_url, title, self.name())
                    .with_dimensions(photo.width, photo.height)
                    .with_provider_id(photo.id.to_string())
                    .with_copyright(Copyright::free("Pexels License", false));
                if let Some(page) = photo.url {
                    raw = raw.with_source_page(page);
                }
                if let Some(name) = photo.photographer {
                    raw = raw.with_photographer(name);
                }
                Some(raw)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for Pexels {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::MissingCredentials(self.name().to_string()))?;

        let url = format!(
            "https://api.pexels.com/v1/search?query={}&per_page={}",
            urlencoding::encode(query),
            limit.clamp(1, MAX_PER_PAGE)
        );

        let response = self.client.get(&url).header("Authorization", key).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::UpstreamStatus(response.status().as_u16()));
        }
        let body = response.text().await?;

        let mut results = self.parse_results(&body)?;
        results.truncate(limit);
        Ok(results)
    }
}
