//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the boundary to the store that persists
//! files, chunks and embeddings and answers nearest-neighbour queries.
//! Backends:
//! - [`sqlite::SqliteIndex`] — the production store (sqlx + SQLite).
//! - [`memory::InMemoryIndex`] — `RwLock`-guarded maps, for tests.
//!
//! Writes are expressed as a list of [`FileMutation`]s and applied by
//! [`VectorIndex::apply`] all-or-nothing: either every file in the batch
//! gets its new chunk set, or none does. Readers therefore never see a file
//! whose chunks come from two different versions.
//!
//! Distance is Euclidean (L2) between the query vector and each stored
//! embedding; results come back ascending by distance.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ChunkRecord, FileRecord, NearestChunk, NewChunk};

/// One file's worth of changes inside an ingestion batch.
#[derive(Debug, Clone)]
pub enum FileMutation {
    /// First ingestion of a previously unseen path.
    Create {
        path: String,
        hash: String,
        repo_name: Option<String>,
        last_commit: Option<String>,
        chunks: Vec<NewChunk>,
    },
    /// Content changed: drop every existing chunk and write `chunks` instead.
    Replace {
        file_id: i64,
        hash: String,
        repo_name: Option<String>,
        last_commit: Option<String>,
        chunks: Vec<NewChunk>,
    },
}

impl FileMutation {
    pub fn chunks(&self) -> &[NewChunk] {
        match self {
            FileMutation::Create { chunks, .. } | FileMutation::Replace { chunks, .. } => chunks,
        }
    }
}

/// Persistent store of files, chunks and embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Look up a file by normalized path.
    async fn find_file(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Apply a batch of mutations in a single transaction.
    async fn apply(&self, mutations: &[FileMutation]) -> Result<()>;

    /// The `limit` chunks nearest to `query`, ascending by distance.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<NearestChunk>>;

    /// All indexed files, most recently created first.
    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    /// Chunks of one file, ordered by chunk index.
    async fn chunks_for(&self, path: &str) -> Result<Vec<ChunkRecord>>;

    /// Delete a file and, by cascade, its chunks. Returns whether it existed.
    async fn delete_file(&self, path: &str) -> Result<bool>;
}

/// Euclidean distance. Callers guarantee equal lengths.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Reject vectors whose length differs from the index dimensionality.
pub(crate) fn check_dims(expected: Option<usize>, actual: usize) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::DimensionMismatch { expected, actual }),
        _ => Ok(()),
    }
}

/// Validate a whole batch before anything is written.
pub(crate) fn check_batch(expected: Option<usize>, mutations: &[FileMutation]) -> Result<()> {
    let mut expected = expected;
    for mutation in mutations {
        for (i, chunk) in mutation.chunks().iter().enumerate() {
            if chunk.chunk_index != i as i64 {
                return Err(Error::validation(format!(
                    "chunk indices must be contiguous from 0; found {} at position {}",
                    chunk.chunk_index, i
                )));
            }
            check_dims(expected, chunk.embedding.len())?;
            // An unpinned index adopts the first dimensionality it sees.
            expected.get_or_insert(chunk.embedding.len());
        }
    }
    Ok(())
}

/// Ascending by distance; ties broken by path then chunk index.
pub(crate) fn sort_nearest(candidates: &mut [NearestChunk]) {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
}
