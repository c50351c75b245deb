//! Google Images scraper.
//!
//! Result pages embed the full-size image list in inline script data as
//! `["<url>",<height>,<width>]` triples. Thumbnails served from gstatic use
//! the same shape and are skipped.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::fetcher::PageFetcher;
use crate::{QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind};

static IMAGE_TRIPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\["(https?://[^"\\]+(?:\\u[0-9a-fA-F]{4}[^"\\]*)*)",(\d+),(\d+)\]"#)
        .expect("valid regex")
});

/// Google image search.
pub struct GoogleImages {
    config: SourceConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl GoogleImages {
    /// Creates a new Google Images source with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: SourceConfig {
                name: "Google Images".to_string(),
                shortcut: "gimg".to_string(),
                kind: SourceKind::Scraper,
                tier: QuotaTier::Heavy,
                timeout: 25,
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

/// Decodes the `\uXXXX` escapes Google uses inside script strings.
fn unescape_script(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let code = rest
            .get(pos + 2..pos + 6)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match code {
            Some(c) => {
                out.push(c);
                rest = &rest[pos + 6..];
            }
            None => {
                out.push_str("\\u");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Human-readable title from the last path segment of an image URL.
fn title_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or_default();
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    let decoded = urlencoding::decode(stem)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| stem.to_string());
    decoded
        .split(['-', '_', '+', ' '])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_blocked(html: &str) -> bool {
    html.contains("/sorry/index") || html.contains("recaptcha") || html.contains("unusual traffic")
}

impl GoogleImages {
    fn parse_results(&self, html: &str) -> Vec<RawResult> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for caps in IMAGE_TRIPLE.captures_iter(html) {
            let url = unescape_script(&caps[1]);
            if url.contains("gstatic.com") || !seen.insert(url.clone()) {
                continue;
            }
            // Google lists height before width.
            let height = caps[2].parse().unwrap_or(0);
            let width = caps[3].parse().unwrap_or(0);
            let title = title_from_url(&url);
            results.push(RawResult::new(url, title, self.name()).with_dimensions(width, height));
        }

        results
    }
}

#[async_trait]
impl SourceAdapter for GoogleImages {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let url = format!(
            "https://www.google.com/search?q={}&tbm=isch&hl=en&safe=active",
            urlencoding::encode(query)
        );

        let html = self.fetcher.fetch(&url).await?;

        if is_blocked(&html) {
            return Err(SearchError::Blocked("Google returned a CAPTCHA page".to_string()));
        }

        let mut results = self.parse_results(&html);
        results.truncate(limit);
        Ok(results)
    }
}
