//! Unsplash source using the official search API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Copyright, QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind,
};

const MAX_PER_PAGE: usize = 30;

/// Unsplash photo search.
pub struct Unsplash {
    config: SourceConfig,
    client: Client,
    access_key: Option<String>,
}

impl Unsplash {
    /// Creates a new Unsplash source. Searches fail with
    /// [`SearchError::MissingCredentials`] until an access key is set.
    pub fn new(client: Client, access_key: Option<String>) -> Self {
        Self {
            config: SourceConfig {
                name: "Unsplash".to_string(),
                shortcut: "unsplash".to_string(),
                kind: SourceKind::Api,
                tier: QuotaTier::Baseline,
                timeout: 15,
                enabled: true,
            },
            client,
            access_key: access_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Creates with custom configuration.
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Deserialize)]
struct UnsplashResponse {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Deserialize)]
struct UnsplashPhoto {
    id: String,
    width: u32,
    height: u32,
    description: Option<String>,
    alt_description: Option<String>,
    urls: UnsplashUrls,
    links: UnsplashLinks,
    user: Option<UnsplashUser>,
    #[serde(default)]
    tags: Vec<UnsplashTag>,
}

#[derive(Deserialize)]
struct UnsplashUrls {
    full: Option<String>,
    regular: Option<String>,
}

#[derive(Deserialize)]
struct UnsplashLinks {
    html: Option<String>,
}

#[derive(Deserialize)]
struct UnsplashUser {
    name: Option<String>,
}

#[derive(Deserialize)]
struct UnsplashTag {
    title: String,
}

impl Unsplash {
    fn parse_results(&self, body: &str) -> Result<Vec<RawResult>> {
        let response: UnsplashResponse =
            serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

        let results = response
            .results
            .into_iter()
            .filter_map(|photo| {
                let image_url = photo.urls.full.or(photo.urls.regular)?;
                let title = photo
                    .description
                    .or(photo.alt_description)
                    .unwrap_or_else(|| "Unsplash photo".to_string());

                let mut raw = RawResult::new(image_url, title, self.name())
                    .with_dimensions(photo.width, photo.height)
                    .with_provider_id(photo.id)
                    .with_tags(photo.tags.into_iter().map(|t| t.title).collect())
                    .with_copyright(Copyright::free("Unsplash License", false));
                if let Some(page) = photo.links.html {
                    raw = raw.with_source_page(page);
                }
                if let Some(name) = photo.user.and_then(|u| u.name) {
                    raw = raw.with_photographer(name);
                }
                Some(raw)
            })
            .collect();

        Ok(results)
    }
}

#[async_trait]
impl SourceAdapter for Unsplash {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let key = self
            .access_key
            .as_deref()
            .ok_or_else(|| SearchError::MissingCredentials(self.name().to_string()))?;

        let url = format!(
            "https://api.unsplash.com/search/photos?query={}&per_page={}",
            urlencoding::encode(query),
            limit.clamp(1, MAX_PER_PAGE)
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Client-ID {}", key))
            .header("Accept-Version", "v1")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SearchError::UpstreamStatus(response.status().as_u16()));
        }
        let body = response.text().await?;

        let mut results = self.parse_results(&body)?;
        results.truncate(limit);
        Ok(results)
    }
}
