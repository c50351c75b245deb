//! Image result types.

use serde::{Deserialize, Serialize};

/// Photographer value used when a source does not credit anyone.
pub const UNKNOWN_PHOTOGRAPHER: &str = "Unknown";

/// Licensing status of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyrightStatus {
    /// Free to use under a permissive license.
    Free,
    /// Usable only under the terms of the rights holder.
    Restricted,
    /// Licensing could not be determined.
    #[default]
    Unknown,
}

/// Licensing metadata attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Copyright {
    pub status: CopyrightStatus,
    pub license: String,
    pub description: String,
    pub can_use_commercially: bool,
    pub requires_attribution: bool,
}

impl Copyright {
    /// A permissive license.
    pub fn free(license: impl Into<String>, requires_attribution: bool) -> Self {
        let license = license.into();
        Self {
            status: CopyrightStatus::Free,
            description: format!("Free to use under the {}", license),
            license,
            can_use_commercially: true,
            requires_attribution,
        }
    }

    /// Rights reserved by the owner.
    pub fn restricted(description: impl Into<String>) -> Self {
        Self {
            status: CopyrightStatus::Restricted,
            license: "All rights reserved".to_string(),
            description: description.into(),
            can_use_commercially: false,
            requires_attribution: true,
        }
    }

    /// Licensing unknown; treat as restricted.
    pub fn unknown() -> Self {
        Self {
            status: CopyrightStatus::Unknown,
            license: "Unknown".to_string(),
            description: "Copyright status unknown. Check the source page before reuse.".to_string(),
            can_use_commercially: false,
            requires_attribution: true,
        }
    }

    /// Whether this is a free license.
    pub fn is_free(&self) -> bool {
        self.status == CopyrightStatus::Free
    }
}

impl Default for Copyright {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A candidate image as returned by a source, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Full-size image URL.
    pub image_url: String,
    /// Page the image was found on.
    pub source_page_url: Option<String>,
    /// Title or description.
    pub title: String,
    /// Width in pixels, 0 when unknown.
    pub width: u32,
    /// Height in pixels, 0 when unknown.
    pub height: u32,
    /// Name of the source that produced this candidate.
    pub source: String,
    /// Provider-side identifier.
    pub provider_id: Option<String>,
    /// File size in bytes when the provider reports it.
    pub size_bytes: Option<u64>,
    /// Credited author.
    pub photographer: Option<String>,
    /// Provider tags.
    pub tags: Vec<String>,
    /// Licensing, when the provider states it.
    pub copyright: Option<Copyright>,
}

impl RawResult {
    /// Creates a new raw candidate.
    pub fn new(
        image_url: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            title: title.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Sets the pixel dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the page the image was found on.
    pub fn with_source_page(mut self, url: impl Into<String>) -> Self {
        self.source_page_url = Some(url.into());
        self
    }

    /// Sets the provider-side identifier.
    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    /// Sets the reported byte size.
    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size_bytes = Some(bytes);
        self
    }

    /// Sets the credited author.
    pub fn with_photographer(mut self, name: impl Into<String>) -> Self {
        self.photographer = Some(name.into());
        self
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the licensing.
    pub fn with_copyright(mut self, copyright: Copyright) -> Self {
        self.copyright = Some(copyright);
        self
    }
}

/// A normalized, possibly multi-source image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    /// Source-prefixed opaque id.
    pub id: String,
    /// Display title; lists every contributing source once merged.
    pub title: String,
    /// Title of the first contributor.
    pub original_title: String,
    /// Proxied URL for display.
    pub display_url: String,
    /// Validated original image URL.
    pub download_url: String,
    /// Page the image was found on.
    pub source_page_url: String,
    /// First contributing source.
    pub source: String,
    /// First contributing source, kept unchanged for audit.
    pub original_source: String,
    /// Every source that produced this image, in merge order.
    pub sources: Vec<String>,
    /// Always `sources.len()`.
    pub source_count: usize,
    pub width: u32,
    pub height: u32,
    /// Human-readable file size.
    pub size_estimate: String,
    pub copyright: Copyright,
    pub photographer: String,
    pub tags: Vec<String>,
    /// Opaque token for the viewer flow.
    #[serde(default)]
    pub hashed_id: String,
}

impl ImageResult {
    /// Pixel area.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether `source` already contributed to this record.
    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }

    /// Whether the photographer is still the placeholder value.
    pub fn has_placeholder_photographer(&self) -> bool {
        self.photographer.is_empty() || self.photographer == UNKNOWN_PHOTOGRAPHER
    }
}

/// Telemetry for one source in one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub name: String,
    /// Candidates requested from this source.
    pub quota: usize,
    /// Raw candidates returned.
    pub count: usize,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Deduplication counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub before_dedup: usize,
    pub after_dedup: usize,
    pub duplicates_removed: usize,
    /// Unique records attributed to more than one source.
    pub multi_source: usize,
}

impl DedupStats {
    /// Builds the counters from the candidate list and the merged output.
    pub fn from_results(before_dedup: usize, results: &[ImageResult]) -> Self {
        let after_dedup = results.len();
        Self {
            before_dedup,
            after_dedup,
            duplicates_removed: before_dedup.saturating_sub(after_dedup),
            multi_source: results.iter().filter(|r| r.source_count > 1).count(),
        }
    }
}

/// Timing statistics across sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingStats {
    /// Slowest source, i.e. the parallel wall time.
    pub total_ms: u64,
    /// Mean of the per-source durations.
    pub average_ms: f64,
}

impl TimingStats {
    /// Computes max and mean over the source reports.
    pub fn from_reports(reports: &[SourceReport]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }
        let total_ms = reports.iter().map(|r| r.duration_ms).max().unwrap_or(0);
        let sum: u64 = reports.iter().map(|r| r.duration_ms).sum();
        Self {
            total_ms,
            average_ms: sum as f64 / reports.len() as f64,
        }
    }
}

/// Aggregate statistics for one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub query: String,
    pub limit: usize,
    pub sources: Vec<SourceReport>,
    pub deduplication: DedupStats,
    pub timing: TimingStats,
}

/// Body of a search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ImageResult>,
    pub summary: SearchSummary,
}

impl SearchResponse {
    /// Returns the results.
    pub fn items(&self) -> &[ImageResult] {
        &self.results
    }
}
