//! Result deduplication and cross-source merging.

use std::collections::HashMap;
use std::sync::LazyLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::ImageResult;

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*://").expect("valid regex"));
static THUMB_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/thumb/.*/").expect("valid regex"));
static DIMENSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:_\d+x\d+)+(\.[a-z0-9]+)$").expect("valid regex"));

/// Default similarity threshold for normalized URLs.
pub const URL_SIMILARITY_THRESHOLD: f64 = 0.95;
/// Default similarity threshold for normalized titles.
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.95;
/// Keys shorter than this are not used for matching.
pub const MIN_KEY_LEN: usize = 5;
/// Titles must be longer than this to be compared.
const MIN_TITLE_LEN: usize = 15;

fn normalize_url_once(url: &str) -> String {
    let mut key = url.trim().to_lowercase();

    if let Some(m) = SCHEME.find(&key) {
        key = key[m.end()..].to_string();
    }
    if let Some(stripped) = key.strip_prefix("www.") {
        key = stripped.to_string();
    }
    if let Some(pos) = key.find('?') {
        key.truncate(pos);
    }
    let key = THUMB_SEGMENT.replace(&key, "/");
    DIMENSION_SUFFIX.replace(&key, "$1").into_owned()
}

/// Normalized URL key used for duplicate detection.
///
/// Lower-cases, strips the scheme, a leading `www.` and the query string,
/// collapses a `/thumb/.../` path segment and strips `_WIDTHxHEIGHT` before
/// the extension. Applied until stable, so the result is idempotent.
pub fn normalize_url(url: &str) -> String {
    let mut key = normalize_url_once(url);
    loop {
        let next = normalize_url_once(&key);
        if next == key {
            return key;
        }
        key = next;
    }
}

/// Normalized title used for title matching.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Positional character-match ratio.
///
/// Counts characters that are equal at the same position over the shared
/// prefix length and divides by the longer length. This is not an edit
/// distance: an insertion near the start makes every later position miss.
/// The merge thresholds are tuned against exactly this behaviour.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longer = a.len().max(b.len());
    if longer == 0 {
        return 1.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / longer as f64
}

/// One unique record plus the keys it is matched on.
struct Unique {
    key: String,
    title_key: String,
    result: ImageResult,
}

/// Folds candidates from every source into unique, merged records.
#[derive(Debug, Clone)]
pub struct Aggregator {
    premium_sources: Vec<String>,
    url_threshold: f64,
    title_threshold: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Creates an aggregator with no premium sources.
    pub fn new() -> Self {
        Self {
            premium_sources: Vec::new(),
            url_threshold: URL_SIMILARITY_THRESHOLD,
            title_threshold: TITLE_SIMILARITY_THRESHOLD,
        }
    }

    /// Sets the sources whose images always win a merge.
    pub fn with_premium_sources(mut self, sources: Vec<String>) -> Self {
        self.premium_sources = sources;
        self
    }

    /// Overrides the URL and title similarity thresholds.
    pub fn with_thresholds(mut self, url: f64, title: f64) -> Self {
        self.url_threshold = url;
        self.title_threshold = title;
        self
    }

    fn is_premium(&self, source: &str) -> bool {
        self.premium_sources.iter().any(|s| s == source)
    }

    /// Deduplicates then shuffles with the given random source.
    pub fn aggregate<R: Rng + ?Sized>(
        &self,
        candidates: Vec<ImageResult>,
        rng: &mut R,
    ) -> Vec<ImageResult> {
        let mut results = self.deduplicate(candidates);
        results.shuffle(rng);
        results
    }

    /// Merges candidates, in order, into unique records.
    ///
    /// Linear scan against every unique record for fuzzy matches, so
    /// `O(n * u)`. Fine for a few hundred candidates per request.
    pub fn deduplicate(&self, candidates: Vec<ImageResult>) -> Vec<ImageResult> {
        let mut uniques: Vec<Unique> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for candidate in candidates {
            let key = normalize_url(&candidate.download_url);
            if key.chars().count() < MIN_KEY_LEN {
                debug!("Skipping candidate with short key: {}", candidate.download_url);
                continue;
            }
            let title_key = normalize_title(&candidate.original_title);

            let matched = by_key
                .get(&key)
                .copied()
                .or_else(|| self.find_similar(&uniques, &key, &title_key, &candidate.source));

            match matched {
                Some(index) => {
                    by_key.entry(key).or_insert(index);
                    self.merge(&mut uniques[index].result, candidate);
                }
                None => {
                    by_key.insert(key.clone(), uniques.len());
                    uniques.push(Unique {
                        key,
                        title_key,
                        result: seed_record(candidate),
                    });
                }
            }
        }

        uniques.into_iter().map(|u| u.result).collect()
    }

    fn find_similar(
        &self,
        uniques: &[Unique],
        key: &str,
        title_key: &str,
        source: &str,
    ) -> Option<usize> {
        let title_comparable = title_key.chars().count() > MIN_TITLE_LEN;

        uniques.iter().position(|unique| {
            if similarity_ratio(key, &unique.key) > self.url_threshold {
                return true;
            }
            title_comparable
                && unique.result.source == source
                && unique.title_key.chars().count() > MIN_TITLE_LEN
                && similarity_ratio(title_key, &unique.title_key) > self.title_threshold
        })
    }

    /// Merges `new` into `existing`. A source never appears twice on a record,
    /// so a candidate from an already-listed source is dropped.
    fn merge(&self, existing: &mut ImageResult, new: ImageResult) {
        if existing.has_source(&new.source) {
            debug!("Dropping repeat from {} for {}", new.source, existing.id);
            return;
        }

        let upgrade = new.area() > existing.area() || self.is_premium(&new.source);
        let credited = !new.has_placeholder_photographer();

        existing.sources.push(new.source.clone());
        existing.source_count = existing.sources.len();
        existing.title = merged_title(&existing.original_title, &existing.sources);

        if upgrade {
            existing.download_url = new.download_url;
            existing.display_url = new.display_url;
            existing.width = new.width;
            existing.height = new.height;
            existing.size_estimate = new.size_estimate;
        }

        if new.copyright.is_free() && !existing.copyright.is_free() {
            existing.copyright = new.copyright;
        }

        if existing.has_placeholder_photographer() && credited {
            existing.photographer = new.photographer;
        }

        for tag in new.tags {
            if !existing.tags.contains(&tag) {
                existing.tags.push(tag);
            }
        }
    }
}

fn seed_record(mut candidate: ImageResult) -> ImageResult {
    candidate.sources = vec![candidate.source.clone()];
    candidate.source_count = 1;
    candidate.original_source = candidate.source.clone();
    candidate
}

fn merged_title(original: &str, sources: &[String]) -> String {
    format!("{} (via {})", original, sources.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Copyright, Normalizer, RawResult};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(url: &str, title: &str, source: &str, w: u32, h: u32) -> ImageResult {
        Normalizer::new()
            .normalize(RawResult::new(url, title, source).with_dimensions(w, h), "")
            .unwrap()
    }

    #[test]
    fn test_normalize_url_strips_scheme_www_query() {
        assert_eq!(
            normalize_url("HTTPS://WWW.Example.com/Path/Cat.JPG?w=200&h=100"),
            "example.com/path/cat.jpg"
        );
    }

    #[test]
    fn test_normalize_url_strips_dimension_suffix() {
        assert_eq!(
            normalize_url("https://cdn.example.com/photos/cat_800x600.jpg"),
            normalize_url("https://cdn.example.com/photos/cat.jpg")
        );
        assert_eq!(normalize_url("a.com/x_1x2_800x600.png"), "a.com/x.png");
    }

    #[test]
    fn test_normalize_url_collapses_thumb_segment() {
        assert_eq!(
            normalize_url("https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Cat.jpg/640px-Cat.jpg"),
            "upload.wikimedia.org/wikipedia/commons/640px-cat.jpg"
        );
    }

    #[test]
    fn test_normalize_url_is_idempotent() {
        for url in [
            "http://http://www.www.example.com/a_1x1.jpg",
            "https://example.com/thumb/x/y/z_10x10.png?q",
            "www.example.com",
        ] {
            let once = normalize_url(url);
            assert_eq!(normalize_url(&once), once);
        }
    }

    #[test]
    fn test_similarity_identical() {
        assert_eq!(similarity_ratio("abcdef", "abcdef"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn test_similarity_positional() {
        assert_eq!(similarity_ratio("abcd", "abxd"), 0.75);
        assert_eq!(similarity_ratio("abcd", "ab"), 0.5);
        // A leading insertion shifts every position.
        assert_eq!(similarity_ratio("xabc", "abc"), 0.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  A Cat!!   on a  Mat. "), "a cat on a mat");
    }

    #[test]
    fn test_exact_key_merges_different_sources() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Pexels", 100, 100),
            candidate("http://www.example.com/cat.jpg?size=l", "Cat", "Pixabay", 100, 100),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sources, vec!["Pexels", "Pixabay"]);
        assert_eq!(results[0].source_count, 2);
        assert_eq!(results[0].title, "Cat (via Pexels, Pixabay)");
        assert_eq!(results[0].original_title, "Cat");
        assert_eq!(results[0].original_source, "Pexels");
        assert_eq!(results[0].source, "Pexels");
    }

    #[test]
    fn test_dimension_suffix_variants_merge() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://cdn.example.com/img/cat_800x600.jpg", "Cat", "Bing Images", 800, 600),
            candidate("https://cdn.example.com/img/cat.jpg", "Cat", "Google Images", 1600, 1200),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_count, 2);
    }

    #[test]
    fn test_same_source_repeat_is_dropped() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Pexels", 100, 100),
            candidate("https://example.com/cat.jpg", "Cat", "Pexels", 900, 900),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sources, vec!["Pexels"]);
        assert_eq!(results[0].width, 100);
        assert_eq!(results[0].title, "Cat");
    }

    #[test]
    fn test_fuzzy_url_match() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate(
                "https://images.example.com/photos/2024/01/very-long-cat-photo-name-a.jpg",
                "Cat",
                "Pexels",
                100,
                100,
            ),
            candidate(
                "https://images.example.com/photos/2024/01/very-long-cat-photo-name-b.jpg",
                "Other",
                "Pixabay",
                100,
                100,
            ),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_count, 2);
    }

    #[test]
    fn test_different_urls_stay_separate() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://a.example.com/cat.jpg", "Cat", "Pexels", 100, 100),
            candidate("https://b.example.org/dog.png", "Dog", "Pixabay", 100, 100),
        ]);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_title_match_requires_same_source() {
        let aggregator = Aggregator::new();
        let title = "Orange tabby cat sleeping on a sofa";
        let results = aggregator.deduplicate(vec![
            candidate("https://a.example.com/1.jpg", title, "Pexels", 100, 100),
            candidate("https://b.example.org/2.png", title, "Pixabay", 100, 100),
        ]);
        assert_eq!(results.len(), 2);

        let results = aggregator.deduplicate(vec![
            candidate("https://a.example.com/1.jpg", title, "Pexels", 100, 100),
            candidate("https://b.example.org/2.png", title, "Pexels", 100, 100),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_count, 1);
    }

    #[test]
    fn test_short_titles_not_compared() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://a.example.com/1.jpg", "Cat", "Pexels", 100, 100),
            candidate("https://b.example.org/2.png", "Cat", "Pexels", 100, 100),
        ]);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_short_keys_are_skipped() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![candidate("https://a.c", "Tiny", "Pexels", 1, 1)]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_merge_upgrades_to_larger_image() {
        let aggregator = Aggregator::new();
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Bing Images", 400, 300),
            candidate("https://example.com/cat.jpg?full", "Cat", "Google Images", 1600, 1200),
            candidate("https://example.com/cat.jpg?mid", "Cat", "DuckDuckGo Images", 800, 600),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].width, 1600);
        assert_eq!(results[0].height, 1200);
        assert_eq!(results[0].download_url, "https://example.com/cat.jpg?full");
        assert_eq!(results[0].source_count, 3);
    }

    #[test]
    fn test_merge_premium_source_wins_regardless_of_size() {
        let aggregator = Aggregator::new().with_premium_sources(vec!["Unsplash".to_string()]);
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg?big", "Cat", "Google Images", 4000, 3000),
            candidate("https://example.com/cat.jpg?small", "Cat", "Unsplash", 400, 300),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].width, 400);
        assert_eq!(results[0].download_url, "https://example.com/cat.jpg?small");
    }

    #[test]
    fn test_merge_upgrades_copyright_to_free() {
        let aggregator = Aggregator::new();
        let mut free = candidate("https://example.com/cat.jpg", "Cat", "Pexels", 10, 10);
        free.copyright = Copyright::free("Pexels License", false);
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Google Images", 10, 10),
            free,
        ]);
        assert!(results[0].copyright.is_free());
    }

    #[test]
    fn test_merge_keeps_free_copyright() {
        let aggregator = Aggregator::new();
        let mut free = candidate("https://example.com/cat.jpg", "Cat", "Pexels", 10, 10);
        free.copyright = Copyright::free("Pexels License", false);
        let mut restricted = candidate("https://example.com/cat.jpg", "Cat", "Google Images", 10, 10);
        restricted.copyright = Copyright::restricted("Getty");
        let results = aggregator.deduplicate(vec![free, restricted]);
        assert_eq!(results[0].copyright.license, "Pexels License");
    }

    #[test]
    fn test_merge_replaces_placeholder_photographer() {
        let aggregator = Aggregator::new();
        let mut credited = candidate("https://example.com/cat.jpg", "Cat", "Pexels", 10, 10);
        credited.photographer = "Jane Doe".to_string();
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Google Images", 10, 10),
            credited,
        ]);
        assert_eq!(results[0].photographer, "Jane Doe");
    }

    #[test]
    fn test_merge_applies_every_upgrade_at_once() {
        let aggregator = Aggregator::new();
        let mut better = candidate("https://example.com/cat.jpg?full", "Cat", "Pixabay", 1600, 1200);
        better.copyright = Copyright::free("Pixabay Content License", false);
        better.photographer = "Jane Doe".to_string();
        better.tags = vec!["cat".to_string()];
        let results = aggregator.deduplicate(vec![
            candidate("https://example.com/cat.jpg", "Cat", "Google Images", 400, 300),
            better,
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].width, 1600);
        assert_eq!(results[0].download_url, "https://example.com/cat.jpg?full");
        assert_eq!(results[0].copyright.license, "Pixabay Content License");
        assert_eq!(results[0].photographer, "Jane Doe");
        assert_eq!(results[0].tags, vec!["cat"]);
        assert_eq!(results[0].source_count, 2);
    }

    #[test]
    fn test_merge_unions_tags() {
        let aggregator = Aggregator::new();
        let mut a = candidate("https://example.com/cat.jpg", "Cat", "Pexels", 10, 10);
        a.tags = vec!["cat".to_string(), "pet".to_string()];
        let mut b = candidate("https://example.com/cat.jpg", "Cat", "Pixabay", 10, 10);
        b.tags = vec!["pet".to_string(), "animal".to_string()];
        let results = aggregator.deduplicate(vec![a, b]);
        assert_eq!(results[0].tags, vec!["cat", "pet", "animal"]);
    }

    #[test]
    fn test_aggregate_shuffle_is_reproducible() {
        let aggregator = Aggregator::new();
        let candidates: Vec<_> = (0..20)
            .map(|i| candidate(&format!("https://example.com/{}/img{}.jpg", i * 7919, i), "x", "Pexels", 1, 1))
            .collect();

        let a = aggregator.aggregate(candidates.clone(), &mut StdRng::seed_from_u64(7));
        let b = aggregator.aggregate(candidates.clone(), &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), aggregator.deduplicate(candidates).len());
    }

    #[test]
    fn test_aggregate_empty() {
        let aggregator = Aggregator::new();
        let results = aggregator.aggregate(vec![], &mut StdRng::seed_from_u64(1));
        assert!(results.is_empty());
    }
}
