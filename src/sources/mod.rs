//! Image source implementations.

use std::sync::Arc;

use reqwest::Client;

use crate::fetcher::PageFetcher;
use crate::{AppConfig, SourceAdapter};

// Stock photo APIs
mod pexels;
mod pixabay;
mod unsplash;
mod wikimedia;

// Search engine scrapers
mod bing;
mod duckduckgo;
mod google;

pub use pexels::Pexels;
pub use pixabay::Pixabay;
pub use unsplash::Unsplash;
pub use wikimedia::WikimediaCommons;

pub use bing::BingImages;
pub use duckduckgo::DuckDuckGoImages;
pub use google::GoogleImages;

/// The standard set of seven sources.
///
/// API sources share `client`; scrapers go through `fetcher`. Sources whose
/// key is absent from `config` are still registered and report
/// [`crate::SearchError::MissingCredentials`] when searched.
pub fn default_sources(
    config: &AppConfig,
    client: Client,
    fetcher: Arc<dyn PageFetcher>,
) -> Vec<Arc<dyn SourceAdapter>> {
    let keys = &config.api_keys;
    vec![
        Arc::new(Unsplash::new(client.clone(), keys.unsplash.clone())),
        Arc::new(Pexels::new(client.clone(), keys.pexels.clone())),
        Arc::new(Pixabay::new(client.clone(), keys.pixabay.clone())),
        Arc::new(WikimediaCommons::new(client)),
        Arc::new(DuckDuckGoImages::new(Arc::clone(&fetcher))),
        Arc::new(GoogleImages::new(Arc::clone(&fetcher))),
        Arc::new(BingImages::new(fetcher)),
    ]
}
