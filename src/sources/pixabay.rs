//! Pixabay source using the official search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Copyright, QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind,
};

/// Pixabay photo search.
pub struct Pixabay {
    config: SourceConfig,
    client: Client,
    api_key: Option<String>,
}

impl Pixabay {
    /// Creates a new Pixabay source.
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            config: SourceConfig {
                name: "Pixabay".to_string(),
                shortcut: "pixabay".to_string(),
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
#[serde(rename_all = "camelCase")]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixabayHit {
    id: u64,
    #[serde(rename = "pageURL")]
    page_url: Option<String>,
    #[serde(default)]
    tags: String,
    #[serde(rename = "largeImageURL")]
    large_image_url: Option<String>,
    #[serde(rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
    image_size: Option<u64>,
    user: Option<String>,
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl Pixabay {
    fn parse_results(&self, body: &str) -> Result<Vec<RawResult>> {
        let response: PixabayResponse =
            serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(response
            .hits
            .into_iter()
            .filter_map(|hit| {
                let image_url = hit.large_image_url.or(hit.webformat_url)?;
                let tags = split_tags(&hit.tags);
                let title = if tags.is_empty() {
                    "Pixabay image".to_string()
                } else {
                    tags.join(", ")
                };

                let mut raw = RawResult::new(image_url, title, self.name())
                    .with_dimensions(hit.image_width, hit.image_height)
                    .with_provider_id(hit.id.to_string())
                    .with_tags(tags)
                    .with_copyright(Copyright::free("Pixabay Content License", false));
                if let Some(page) = hit.page_url {
                    raw = raw.with_source_page(page);
                }
                if let Some(size) = hit.image_size {
                    raw = raw.with_size(size);
                }
                if let Some(user) = hit.user {
                    raw = raw.with_photographer(user);
                }
                Some(raw)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for Pixabay {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::MissingCredentials(self.name().to_string()))?;

        // per_page must lie in 3..=200
        let url = format!(
            "https://pixabay.com/api/?key={}&q={}&image_type=photo&safesearch=true&per_page={}",
            urlencoding::encode(key),
            urlencoding::encode(query),
            limit.clamp(3, 200)
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::UpstreamStatus(response.status().as_u16()));
        }
        let body = response.text().await?;

        let mut results = self.parse_results(&body)?;
        results.truncate(limit);
        Ok(results)
    }
}
