//! Core data models used throughout the ingestion and query paths.
//!
//! Records mirror the two persisted tables (files, chunks); the remaining
//! types are the serialized shapes returned by search and generation.

use serde::{Deserialize, Serialize};

/// An indexed file. Identity is the normalized relative `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    /// Hex SHA-256 of the file bytes at last ingestion.
    pub hash: String,
    pub repo_name: Option<String>,
    pub last_commit: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A chunk ready to be written, with its embedding.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A stored chunk as read back from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub file_id: i64,
    pub chunk_index: i64,
    pub content: String,
}

/// One row of a nearest-neighbour query, ascending by `distance`.
#[derive(Debug, Clone)]
pub struct NearestChunk {
    pub file_path: String,
    pub chunk_index: i64,
    pub content: String,
    pub distance: f64,
}

/// Outcome counters for one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub new_files: u64,
    pub updated_files: u64,
    pub skipped_files: u64,
    pub total_files: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    pub chunk_index: i64,
    pub content_snippet: String,
    /// `1 / (1 + distance)`, rounded to 3 places; higher is better.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub latency_ms: f64,
    pub top_similarity: f64,
    pub avg_similarity: f64,
    pub results_returned: usize,
    /// How many fetched candidates were cut by `min_similarity`.
    pub results_filtered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub llm_latency_ms: f64,
    pub context_tokens: usize,
    pub sources_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub retrieval_metrics: RetrievalMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchResponse {
    pub query: String,
    pub answer: String,
    pub results: Vec<SearchResult>,
    pub retrieval_metrics: RetrievalMetrics,
    pub generation_metrics: GenerationMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSearchResponse {
    pub provider: String,
    pub answer: String,
    pub latency_ms: f64,
}

/// Row of the files listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    pub path: String,
    pub hash: String,
    pub repo_name: Option<String>,
    /// ISO 8601.
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileInfo>,
    pub total: usize,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        FileInfo {
            id: record.id,
            path: record.path.clone(),
            hash: record.hash.clone(),
            repo_name: record.repo_name.clone(),
            created_at: format_ts_iso(record.created_at),
        }
    }
}

pub(crate) fn format_ts_iso(ts: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}
