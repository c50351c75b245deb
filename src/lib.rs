//! # a3s-image-search
//!
//! An image meta search engine. Queries stock photo APIs and image search
//! engines concurrently, merges duplicate findings across sources, and
//! serves the images through a retrying streaming proxy.
//!
//! - Async parallel fan-out with per-source quotas and telemetry
//! - Similarity-based deduplication with cross-source merging
//! - Resilient image fetching with retries and placeholder fallback
//! - Stateless opaque tokens for reopening a result later
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use a3s_image_search::{sources, AppConfig, ResilientFetcher, Search, TokenCodec};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let codec = Arc::new(TokenCodec::new(&config.token_secret));
//!     let fetcher = Arc::new(ResilientFetcher::new()?);
//!
//!     let mut search = Search::new(&config, codec);
//!     for source in sources::default_sources(&config, reqwest::Client::new(), fetcher) {
//!         search.add_shared_source(source);
//!     }
//!
//!     let response = search.search("cats", 60).await?;
//!     for result in response.items() {
//!         println!("{} ({}): {}", result.title, result.source_count, result.download_url);
//!     }
//!     Ok(())
//! }
//! ```

mod aggregator;
mod config;
mod error;
mod result;
mod search;
mod source;
mod token;

pub mod fetcher;
pub mod normalize;
pub mod placeholder;
pub mod server;
pub mod sources;

pub use aggregator::{normalize_title, normalize_url, similarity_ratio, Aggregator};
pub use config::{ApiKeys, AppConfig, DEVELOPMENT_SECRET};
pub use error::{Result, SearchError};
pub use fetcher::{FetchPolicy, FetchedImage, PageFetcher, ResilientFetcher};
pub use normalize::Normalizer;
pub use result::{
    Copyright, CopyrightStatus, DedupStats, ImageResult, RawResult, SearchResponse, SearchSummary,
    SourceReport, TimingStats,
};
pub use search::Search;
pub use source::{QuotaTier, SourceAdapter, SourceConfig, SourceKind};
pub use token::{TokenCodec, TokenPayload};
