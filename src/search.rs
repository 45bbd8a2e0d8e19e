//! Similarity retrieval.
//!
//! 1. Embed the query (one call).
//! 2. Fetch the `min(2 * top_k, max_fetch)` nearest chunks from the index.
//! 3. Map each distance to `similarity = 1 / (1 + distance)`, rounded to 3
//!    places: distance 0 gives 1.0, and the score falls towards 0 as the
//!    distance grows.
//! 4. Drop results below `min_similarity`, then keep the first `top_k`.
//!
//! Over-fetching by 2x leaves room for the threshold filter to remove
//! candidates and still fill `top_k` slots.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::{embed_query, EmbeddingClient};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::{RetrievalMetrics, SearchResult};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 20;

/// Reject queries made only of whitespace or control characters.
pub fn validate_query(query: &str) -> Result<()> {
    if query.chars().all(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::validation("query must not be empty"));
    }
    Ok(())
}

/// Validated search parameters.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub top_k: usize,
    pub min_similarity: f64,
}

impl SearchParams {
    /// Reject blank queries and out-of-range bounds before any I/O.
    pub fn new(query: &str, top_k: Option<usize>, min_similarity: Option<f64>) -> Result<Self> {
        validate_query(query)?;
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(Error::validation(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, top_k
            )));
        }
        let min_similarity = min_similarity.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(Error::validation(format!(
                "min_similarity must be between 0.0 and 1.0, got {}",
                min_similarity
            )));
        }
        Ok(Self {
            query: query.to_string(),
            top_k,
            min_similarity,
        })
    }
}

pub struct RetrievalEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    snippet_chars: usize,
    max_fetch: usize,
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        snippet_chars: usize,
        max_fetch: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            snippet_chars,
            max_fetch,
        }
    }

    /// Rank stored chunks against `params.query`.
    ///
    /// Embedding or index failures abort the call; no partial results.
    pub async fn search(&self, params: &SearchParams) -> Result<(Vec<SearchResult>, RetrievalMetrics)> {
        let started = Instant::now();

        let query_vec = embed_query(self.embedder.as_ref(), &params.query).await?;
        let limit = fetch_limit(params.top_k, self.max_fetch);
        let candidates = self.index.nearest(&query_vec, limit).await?;
        let fetched = candidates.len();

        let passing: Vec<SearchResult> = candidates
            .into_iter()
            .map(|c| SearchResult {
                similarity: similarity_from_distance(c.distance),
                content_snippet: make_snippet(&c.content, self.snippet_chars),
                file_path: c.file_path,
                chunk_index: c.chunk_index,
            })
            .filter(|r| r.similarity >= params.min_similarity)
            .collect();
        let results_filtered = fetched - passing.len();

        let mut results = passing;
        results.truncate(params.top_k);

        let metrics = RetrievalMetrics {
            latency_ms: elapsed_ms(started),
            top_similarity: results.first().map(|r| r.similarity).unwrap_or(0.0),
            avg_similarity: mean_similarity(&results),
            results_returned: results.len(),
            results_filtered,
        };

        tracing::debug!(
            fetched,
            returned = metrics.results_returned,
            filtered = metrics.results_filtered,
            latency_ms = metrics.latency_ms,
            "search complete"
        );
        Ok((results, metrics))
    }
}

pub fn fetch_limit(top_k: usize, max_fetch: usize) -> usize {
    (top_k * 2).min(max_fetch)
}

/// `1 / (1 + d)` rounded to 3 places.
pub fn similarity_from_distance(distance: f64) -> f64 {
    round_to(1.0 / (1.0 + distance.max(0.0)), 3)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// First `max_chars` characters with newlines collapsed to spaces.
pub fn make_snippet(content: &str, max_chars: usize) -> String {
    content
        .chars()
        .take(max_chars)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

/// Number of distinct files among `results`.
pub fn distinct_sources(results: &[SearchResult]) -> usize {
    results
        .iter()
        .map(|r| r.file_path.as_str())
        .collect::<HashSet<_>>()
        .len()
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    round_to(started.elapsed().as_secs_f64() * 1000.0, 1)
}

fn mean_similarity(results: &[SearchResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let sum: f64 = results.iter().map(|r| r.similarity).sum();
    round_to(sum / results.len() as f64, 3)
}
