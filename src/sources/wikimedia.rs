//! Wikimedia Commons source using the MediaWiki query API.
//!
//! Commons needs no API key. Licensing comes from each file's
//! `extmetadata`, so results carry the actual license rather than a
//! provider-wide default.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Copyright, QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind,
};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Wikimedia Commons file search.
pub struct WikimediaCommons {
    config: SourceConfig,
    client: Client,
}

impl WikimediaCommons {
    /// Creates a new Wikimedia Commons source.
    pub fn new(client: Client) -> Self {
        Self {
            config: SourceConfig {
                name: "Wikimedia Commons".to_string(),
                shortcut: "wikimedia".to_string(),
                kind: SourceKind::Api,
                tier: QuotaTier::Baseline,
                timeout: 15,
                enabled: true,
            },
            client,
        }
    }

    /// Creates with custom configuration.
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Deserialize)]
struct CommonsResponse {
    query: Option<CommonsQuery>,
}

#[derive(Deserialize)]
struct CommonsQuery {
    #[serde(default)]
    pages: HashMap<String, CommonsPage>,
}

#[derive(Deserialize)]
struct CommonsPage {
    pageid: u64,
    #[serde(default)]
    index: u32,
    title: String,
    #[serde(default)]
    imageinfo: Vec<CommonsImageInfo>,
}

#[derive(Deserialize)]
struct CommonsImageInfo {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    size: Option<u64>,
    descriptionurl: Option<String>,
    #[serde(default)]
    extmetadata: HashMap<String, MetadataValue>,
}

#[derive(Deserialize)]
struct MetadataValue {
    value: serde_json::Value,
}

fn metadata_text(meta: &HashMap<String, MetadataValue>, key: &str) -> Option<String> {
    let text = match &meta.get(key)?.value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let text = HTML_TAG.replace_all(&text, "").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Maps a Commons license short name onto a [`Copyright`].
fn license_copyright(license: Option<&str>) -> Copyright {
    let Some(license) = license else {
        return Copyright::unknown();
    };
    let lower = license.to_lowercase();
    if lower.contains("public domain") || lower == "pd" || lower.starts_with("cc0") {
        Copyright::free(license, false)
    } else if lower.starts_with("cc by") || lower.starts_with("cc-by") {
        let mut copyright = Copyright::free(license, true);
        if lower.contains("nc") {
            copyright.can_use_commercially = false;
        }
        copyright
    } else {
        Copyright::restricted(format!("Licensed under {}", license))
    }
}

/// Strips the `File:` namespace and the extension from a page title.
fn display_title(page_title: &str) -> String {
    let name = page_title.strip_prefix("File:").unwrap_or(page_title);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

impl WikimediaCommons {
    fn parse_results(&self, body: &str) -> Result<Vec<RawResult>> {
        let response: CommonsResponse =
            serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

        let mut pages: Vec<CommonsPage> = response
            .query
            .map(|q| q.pages.into_values().collect())
            .unwrap_or_default();
        pages.sort_by_key(|p| p.index);

        Ok(pages
            .into_iter()
            .filter_map(|page| {
                let info = page.imageinfo.into_iter().next()?;
                let license = metadata_text(&info.extmetadata, "LicenseShortName");

                let mut raw = RawResult::new(info.url, display_title(&page.title), self.name())
                    .with_dimensions(info.width, info.height)
                    .with_provider_id(page.pageid.to_string())
                    .with_copyright(license_copyright(license.as_deref()));
                if let Some(page_url) = info.descriptionurl {
                    raw = raw.with_source_page(page_url);
                }
                if let Some(size) = info.size {
                    raw = raw.with_size(size);
                }
                if let Some(artist) = metadata_text(&info.extmetadata, "Artist") {
                    raw = raw.with_photographer(artist);
                }
                Some(raw)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for WikimediaCommons {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let url = format!(
            "https://commons.wikimedia.org/w/api.php?action=query&format=json\
             &generator=search&gsrnamespace=6&gsrsearch={}&gsrlimit={}\
             &prop=imageinfo&iiprop=url|size|extmetadata",
            urlencoding::encode(query),
            limit.clamp(1, 50)
        );

        let response = self
            .client
            .get(&url)
            .header("User-Agent", concat!("a3s-image-search/", env!("CARGO_PKG_VERSION")))
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
