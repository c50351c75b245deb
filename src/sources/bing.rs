//! Bing Images scraper.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::fetcher::PageFetcher;
use crate::{QuotaTier, RawResult, Result, SearchError, SourceAdapter, SourceConfig, SourceKind};

static DIMENSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[x×]\s*(\d+)").expect("valid regex"));

/// Bing image search.
pub struct BingImages {
    config: SourceConfig,
    fetcher: Arc<dyn PageFetcher>,
}

impl BingImages {
    /// Creates a new Bing Images source with the given page fetcher.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: SourceConfig {
                name: "Bing Images".to_string(),
                shortcut: "bimg".to_string(),
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

/// Metadata Bing stores as JSON in the `m` attribute of each result link.
#[derive(Deserialize)]
struct BingMeta {
    murl: Option<String>,
    purl: Option<String>,
    #[serde(default)]
    t: String,
}

fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let caps = DIMENSIONS.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn is_blocked(html: &str) -> bool {
    html.contains("b_captcha") || html.contains("/challenge/verify")
}

impl BingImages {
    fn parse_results(&self, html: &str) -> Result<Vec<RawResult>> {
        let document = Html::parse_document(html);

        let container_selector = Selector::parse("div.imgpt")
            .map_err(|e| SearchError::Parse(format!("Failed to parse selector: {:?}", e)))?;
        let link_selector = Selector::parse("a.iusc[m]")
            .map_err(|e| SearchError::Parse(format!("Failed to parse selector: {:?}", e)))?;
        let info_selector = Selector::parse("div.img_info span.nowrap")
            .map_err(|e| SearchError::Parse(format!("Failed to parse selector: {:?}", e)))?;

        let mut results = Vec::new();

        for container in document.select(&container_selector) {
            let Some(link) = container.select(&link_selector).next() else {
                continue;
            };
            let meta: BingMeta = match link.value().attr("m").map(serde_json::from_str::<BingMeta>) {
                Some(Ok(meta)) => meta,
                _ => continue,
            };
            let Some(image_url) = meta.murl.filter(|u| !u.is_empty()) else {
                continue;
            };

            let mut raw = RawResult::new(image_url, meta.t.trim(), self.name());
            let dimensions = container
                .select(&info_selector)
                .next()
                .and_then(|el| parse_dimensions(&el.text().collect::<String>()));
            if let Some((width, height)) = dimensions {
                raw = raw.with_dimensions(width, height);
            }
            if let Some(page) = meta.purl {
                raw = raw.with_source_page(page);
            }
            results.push(raw);
        }

        Ok(results)
    }
}

#[async_trait]
impl SourceAdapter for BingImages {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let url = format!(
            "https://www.bing.com/images/search?q={}&form=HDRSC2&first=1&count={}",
            urlencoding::encode(query),
            limit.clamp(1, 150)
        );

        let html = self.fetcher.fetch(&url).await?;

        if is_blocked(&html) {
            return Err(SearchError::Blocked("Bing returned a challenge page".to_string()));
        }

        let mut results = self.parse_results(&html)?;
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StaticFetcher;

    const PAGE: &str = r#"<html><body><ul>
        <li><div class="imgpt">
            <a class="iusc" m='{"cid":"1","purl":"https://pets.example.com/cats","murl":"https://pets.example.com/img/cat.jpg","turl":"https://tse2.mm.bing.net/th?id=1","t":"  Cat on a mat "}' href="/images/search?view=detailV2"></a>
            <div class="img_info"><span class="nowrap">1920 x 1080 · jpeg</span></div>
        </div></li>
        <li><div class="imgpt">
            <a class="iusc" m='{"murl":"https://other.example.org/kitten.png","t":"Kitten"}'></a>
        </div></li>
        <li><div class="imgpt">
            <a class="iusc" m='not json'></a>
        </div></li>
        <li><div class="imgpt"><span>no link</span></div></li>
    </ul></body></html>"#;

    fn make_bing(fetcher: StaticFetcher) -> BingImages {
        BingImages::new(Arc::new(fetcher))
    }

    #[test]
    fn test_bing_new() {
        let source = make_bing(StaticFetcher::new());
        assert_eq!(source.name(), "Bing Images");
        assert_eq!(source.shortcut(), "bimg");
        assert_eq!(source.tier(), QuotaTier::Heavy);
    }

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("1920 x 1080 · jpeg"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("640×480"), Some((640, 480)));
        assert_eq!(parse_dimensions("jpeg"), None);
    }

    #[test]
    fn test_parse_results() {
        let results = make_bing(StaticFetcher::new()).parse_results(PAGE).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].image_url, "https://pets.example.com/img/cat.jpg");
        assert_eq!(results[0].title, "Cat on a mat");
        assert_eq!((results[0].width, results[0].height), (1920, 1080));
        assert_eq!(results[0].source_page_url.as_deref(), Some("https://pets.example.com/cats"));
        assert_eq!(results[1].title, "Kitten");
        assert_eq!((results[1].width, results[1].height), (0, 0));
    }

    #[tokio::test]
    async fn test_search_detects_challenge() {
        let fetcher = StaticFetcher::new().with_page("bing.com", r#"<div id="b_captcha"></div>"#);
        let result = make_bing(fetcher).search("cats", 10).await;
        assert!(matches!(result, Err(SearchError::Blocked(_))));
    }

    #[tokio::test]
    async fn test_search_propagates_fetch_error() {
        let result = make_bing(StaticFetcher::new()).search("cats", 10).await;
        assert!(matches!(result, Err(SearchError::UpstreamStatus(404))));
    }
}
