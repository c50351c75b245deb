//! Candidate normalization: URL validation, proxied display URLs and size
//! estimates.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use sha2::{Digest, Sha256};
use tracing::debug;
use url::{Host, Url};

use crate::result::UNKNOWN_PHOTOGRAPHER;
use crate::{Copyright, ImageResult, RawResult, Result, SearchError};

/// Route the display URL goes through.
pub const PROXY_ROUTE: &str = "/api/proxy-image";

/// Validates an image URL against the scheme and host blocklist.
///
/// Only `http`/`https` pass. Loopback, private, link-local and unspecified
/// addresses are rejected, as is `localhost`.
pub fn validate_image_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SearchError::InvalidUrl(format!("scheme '{}' not allowed", scheme))),
    }

    match url.host() {
        None => return Err(SearchError::InvalidUrl("missing host".into())),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(SearchError::InvalidUrl(format!("host '{}' not allowed", domain)));
            }
        }
        Some(Host::Ipv4(ip)) => {
            if is_blocked_ip(IpAddr::V4(ip)) {
                return Err(SearchError::InvalidUrl(format!("address {} not allowed", ip)));
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_blocked_ip(IpAddr::V6(ip)) {
                return Err(SearchError::InvalidUrl(format!("address {} not allowed", ip)));
            }
        }
    }

    Ok(url)
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link local
    ip.is_loopback() || ip.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Estimated file size for an image of the given dimensions.
///
/// Three bytes per pixel, compressed to roughly 70%.
pub fn estimate_size(width: u32, height: u32) -> u64 {
    (f64::from(width) * f64::from(height) * 3.0 * 0.7) as u64
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{} KB", (bytes as f64 / KB as f64).round() as u64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Display URL routed through the image proxy.
pub fn proxied_url(download_url: &str) -> String {
    format!("{}?url={}", PROXY_ROUTE, urlencoding::encode(download_url))
}

/// Size string for a candidate: reported bytes first, then the estimate.
pub fn size_label(size_bytes: Option<u64>, width: u32, height: u32) -> String {
    match size_bytes {
        Some(bytes) if bytes > 0 => format_size(bytes),
        _ if width > 0 && height > 0 => format_size(estimate_size(width, height)),
        _ => "Unknown".to_string(),
    }
}

/// Short stable digest of a URL, used for ids when the provider has none.
fn url_digest(url: &str) -> String {
    Sha256::digest(url.as_bytes())
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Turns raw candidates into canonical [`ImageResult`]s.
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Creates a new normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalizes one candidate. `prefix` becomes the id prefix.
    ///
    /// Returns `None` when the image URL fails validation.
    pub fn normalize(&self, raw: RawResult, prefix: &str) -> Option<ImageResult> {
        let download_url = match validate_image_url(&raw.image_url) {
            Ok(url) => url.to_string(),
            Err(e) => {
                debug!("Dropping candidate from {}: {}", raw.source, e);
                return None;
            }
        };

        let prefix = if prefix.is_empty() { slug(&raw.source) } else { prefix.to_string() };
        let id = match raw.provider_id.as_deref() {
            Some(pid) if !pid.is_empty() => format!("{}_{}", prefix, pid),
            _ => format!("{}_{}", prefix, url_digest(&download_url)),
        };

        let title = match raw.title.trim() {
            "" => format!("{} image", raw.source),
            t => t.to_string(),
        };

        let photographer = raw
            .photographer
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_PHOTOGRAPHER.to_string());

        Some(ImageResult {
            id,
            original_title: title.clone(),
            title,
            display_url: proxied_url(&download_url),
            source_page_url: raw.source_page_url.unwrap_or_else(|| download_url.clone()),
            size_estimate: size_label(raw.size_bytes, raw.width, raw.height),
            download_url,
            original_source: raw.source.clone(),
            sources: vec![raw.source.clone()],
            source_count: 1,
            source: raw.source,
            width: raw.width,
            height: raw.height,
            copyright: raw.copyright.unwrap_or_else(Copyright::unknown),
            photographer,
            tags: raw.tags,
            hashed_id: String::new(),
        })
    }

    /// Normalizes a batch, silently dropping invalid candidates.
    pub fn normalize_all(&self, raws: Vec<RawResult>, prefix: &str) -> Vec<ImageResult> {
        raws.into_iter().filter_map(|raw| self.normalize(raw, prefix)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_public_https() {
        assert!(validate_image_url("https://images.example.com/cat.jpg").is_ok());
        assert!(validate_image_url("http://93.184.216.34/cat.jpg").is_ok());
    }

    #[test]
    fn test_validate_rejects_schemes() {
        for url in [
            "data:image/png;base64,AAAA",
            "javascript:alert(1)",
            "file:///etc/passwd",
            "ftp://example.com/a.jpg",
        ] {
            assert!(validate_image_url(url).is_err(), "{} should be rejected", url);
        }
    }

    #[test]
    fn test_validate_rejects_local_hosts() {
        for url in [
            "http://localhost/a.jpg",
            "http://127.0.0.1/a.jpg",
            "http://10.0.0.5/a.jpg",
            "http://172.16.3.4/a.jpg",
            "http://192.168.1.1/a.jpg",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/a.jpg",
            "http://[::1]/a.jpg",
            "http://[fd00::1]/a.jpg",
            "http://[::ffff:127.0.0.1]/a.jpg",
        ] {
            assert!(validate_image_url(url).is_err(), "{} should be rejected", url);
        }
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate_image_url("not a url").is_err());
        assert!(validate_image_url("").is_err());
    }

    #[test]
    fn test_estimate_size() {
        assert_eq!(estimate_size(1000, 1000), 2_100_000);
        assert_eq!(estimate_size(0, 600), 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(1536), "2 KB");
        assert_eq!(format_size(2_100_000), "2.0 MB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[test]
    fn test_size_label_prefers_reported_bytes() {
        assert_eq!(size_label(Some(2048), 1000, 1000), "2 KB");
        assert_eq!(size_label(None, 1000, 1000), "2.0 MB");
        assert_eq!(size_label(None, 0, 0), "Unknown");
    }

    #[test]
    fn test_proxied_url_encodes_target() {
        let url = proxied_url("https://example.com/a b.jpg?x=1&y=2");
        assert!(url.starts_with("/api/proxy-image?url=https%3A%2F%2Fexample.com"));
        assert!(!url[PROXY_ROUTE.len() + 5..].contains('&'));
    }

    #[test]
    fn test_normalize_builds_result() {
        let raw = RawResult::new("https://images.example.com/cat.jpg", "  A cat  ", "Pexels")
            .with_dimensions(1000, 1000)
            .with_provider_id("123")
            .with_source_page("https://example.com/photo/123");
        let result = Normalizer::new().normalize(raw, "pexels").unwrap();
        assert_eq!(result.id, "pexels_123");
        assert_eq!(result.title, "A cat");
        assert_eq!(result.original_title, "A cat");
        assert_eq!(result.download_url, "https://images.example.com/cat.jpg");
        assert!(result.display_url.starts_with(PROXY_ROUTE));
        assert_eq!(result.source_page_url, "https://example.com/photo/123");
        assert_eq!(result.sources, vec!["Pexels"]);
        assert_eq!(result.source_count, 1);
        assert_eq!(result.original_source, "Pexels");
        assert_eq!(result.size_estimate, "2.0 MB");
        assert_eq!(result.photographer, UNKNOWN_PHOTOGRAPHER);
        assert_eq!(result.copyright, Copyright::unknown());
        assert!(result.hashed_id.is_empty());
    }

    #[test]
    fn test_normalize_id_from_url_digest() {
        let raw = RawResult::new("https://images.example.com/cat.jpg", "Cat", "Bing Images");
        let a = Normalizer::new().normalize(raw.clone(), "").unwrap();
        let b = Normalizer::new().normalize(raw, "").unwrap();
        assert!(a.id.starts_with("bingimages_"));
        assert_eq!(a.id.len(), "bingimages_".len() + 12);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_normalize_drops_invalid_url() {
        let raw = RawResult::new("javascript:alert(1)", "Evil", "Google Images");
        assert!(Normalizer::new().normalize(raw, "gimg").is_none());
    }

    #[test]
    fn test_normalize_all_filters() {
        let raws = vec![
            RawResult::new("https://example.com/a.jpg", "A", "Pixabay"),
            RawResult::new("http://127.0.0.1/b.jpg", "B", "Pixabay"),
            RawResult::new("https://example.com/c.jpg", "", "Pixabay"),
        ];
        let results = Normalizer::new().normalize_all(raws, "pixabay");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title, "Pixabay image");
    }
}
