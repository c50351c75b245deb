//! Search orchestration.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::{
    Aggregator, AppConfig, DedupStats, ImageResult, Normalizer, RawResult, Result, SearchError,
    SearchResponse, SearchSummary, SourceAdapter, SourceReport, TimingStats, TokenCodec,
};

/// Image meta search that fans a query out to every enabled source.
pub struct Search {
    sources: Vec<Arc<dyn SourceAdapter>>,
    aggregator: Aggregator,
    normalizer: Normalizer,
    codec: Arc<TokenCodec>,
    rng: Mutex<StdRng>,
    max_timeout: Duration,
    default_limit: usize,
}

/// Outcome of one source run, collected at the join.
struct SourceRun {
    report: SourceReport,
    shortcut: String,
    results: Vec<RawResult>,
}

impl Search {
    /// Creates a search with no sources.
    pub fn new(config: &AppConfig, codec: Arc<TokenCodec>) -> Self {
        Self {
            sources: Vec::new(),
            aggregator: Aggregator::new().with_premium_sources(config.premium_sources.clone()),
            normalizer: Normalizer::new(),
            codec,
            rng: Mutex::new(StdRng::from_entropy()),
            max_timeout: Duration::from_secs(config.source_timeout_secs),
            default_limit: config.default_limit,
        }
    }

    /// Seeds the shuffle so result order is reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Replaces the aggregator.
    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Adds an image source.
    pub fn add_source<S: SourceAdapter + 'static>(&mut self, source: S) {
        self.sources.push(Arc::new(source));
    }

    /// Adds an already shared image source.
    pub fn add_shared_source(&mut self, source: Arc<dyn SourceAdapter>) {
        self.sources.push(source);
    }

    /// Caps every source's own timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.max_timeout = timeout;
    }

    /// Returns the number of configured sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Returns the configured sources.
    pub fn sources(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.sources
    }

    /// Searches every enabled source and merges the results.
    ///
    /// Failing or slow sources contribute nothing; their failure is visible
    /// only in the summary. A `limit` of zero means the configured default.
    /// Results are not truncated to `limit`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery("Query cannot be empty".into()));
        }
        if self.sources.is_empty() {
            return Err(SearchError::NoSources);
        }
        let limit = if limit == 0 { self.default_limit } else { limit };

        let enabled: Vec<_> = self.sources.iter().filter(|s| s.is_enabled()).collect();
        debug!("Searching {} sources for '{}' (limit {})", enabled.len(), query, limit);

        let mut pending: FuturesUnordered<_> = enabled
            .into_iter()
            .map(|source| self.run_source(Arc::clone(source), query, limit))
            .collect();

        let mut runs = Vec::new();
        while let Some(run) = pending.next().await {
            runs.push(run);
        }

        let mut candidates: Vec<ImageResult> = Vec::new();
        let mut reports = Vec::with_capacity(runs.len());
        for run in runs {
            candidates.extend(self.normalizer.normalize_all(run.results, &run.shortcut));
            reports.push(run.report);
        }

        let before_dedup = candidates.len();
        let mut results = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.aggregator.aggregate(candidates, &mut *rng)
        };
        self.attach_tokens(&mut results);

        let deduplication = DedupStats::from_results(before_dedup, &results);
        let timing = TimingStats::from_reports(&reports);
        info!(
            "Search '{}': {} candidates, {} unique, {}ms",
            query, before_dedup, deduplication.after_dedup, timing.total_ms
        );

        Ok(SearchResponse {
            results,
            summary: SearchSummary {
                query: query.to_string(),
                limit,
                sources: reports,
                deduplication,
                timing,
            },
        })
    }

    async fn run_source(
        &self,
        source: Arc<dyn SourceAdapter>,
        query: &str,
        limit: usize,
    ) -> SourceRun {
        let name = source.name().to_string();
        let quota = source.tier().quota(limit);
        let timeout_duration = Duration::from_secs(source.config().timeout).min(self.max_timeout);

        let start = Instant::now();
        let outcome = timeout(timeout_duration, source.search(query, quota)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (results, error) = match outcome {
            Ok(Ok(results)) => {
                debug!("Source {} returned {} results in {}ms", name, results.len(), duration_ms);
                (results, None)
            }
            Ok(Err(e)) => {
                warn!("Source {} failed: {}", name, e);
                (Vec::new(), Some(e.to_string()))
            }
            Err(_) => {
                warn!("Source {} timed out", name);
                (Vec::new(), Some(SearchError::Timeout.to_string()))
            }
        };

        SourceRun {
            report: SourceReport {
                name,
                quota,
                count: results.len(),
                duration_ms,
                success: error.is_none(),
                error,
            },
            shortcut: source.shortcut().to_string(),
            results,
        }
    }

    fn attach_tokens(&self, results: &mut [ImageResult]) {
        for result in results.iter_mut() {
            match self.codec.encode_result(result) {
                Ok(token) => result.hashed_id = token,
                Err(e) => warn!("Failed to encode token for {}: {}", result.id, e),
            }
        }
    }
}
