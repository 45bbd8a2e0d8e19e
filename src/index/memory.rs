//! In-memory [`VectorIndex`] for tests and throwaway sessions.
//!
//! All state lives behind one `std::sync::RwLock`, so a batch is applied
//! under a single write guard and readers see it entirely or not at all.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{check_batch, check_dims, l2_distance, sort_nearest, FileMutation, VectorIndex};
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, FileRecord, NearestChunk, NewChunk};

#[derive(Default)]
struct State {
    files: BTreeMap<String, FileRecord>,
    chunks: BTreeMap<i64, Vec<NewChunk>>,
    next_id: i64,
    dims: Option<usize>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that only accepts vectors of length `dims`.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            state: RwLock::new(State {
                dims: Some(dims),
                ..State::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::config("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::config("in-memory index lock poisoned"))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn find_file(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self.read()?.files.get(path).cloned())
    }

    async fn apply(&self, mutations: &[FileMutation]) -> Result<()> {
        let mut state = self.write()?;
        check_batch(state.dims, mutations)?;

        // Reject conflicts up front so a failing batch changes nothing.
        let mut seen = std::collections::HashSet::new();
        for mutation in mutations {
            match mutation {
                FileMutation::Create { path, .. } => {
                    if state.files.contains_key(path) || !seen.insert(path.as_str()) {
                        return Err(Error::validation(format!("file already indexed: {}", path)));
                    }
                }
                FileMutation::Replace { file_id, .. } => {
                    if !state.files.values().any(|f| f.id == *file_id) {
                        return Err(Error::validation(format!("unknown file id: {}", file_id)));
                    }
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        for mutation in mutations {
            match mutation {
                FileMutation::Create {
                    path,
                    hash,
                    repo_name,
                    last_commit,
                    chunks,
                } => {
                    state.next_id += 1;
                    let id = state.next_id;
                    state.files.insert(
                        path.clone(),
                        FileRecord {
                            id,
                            path: path.clone(),
                            hash: hash.clone(),
                            repo_name: repo_name.clone(),
                            last_commit: last_commit.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    state.chunks.insert(id, chunks.clone());
                }
                FileMutation::Replace {
                    file_id,
                    hash,
                    repo_name,
                    last_commit,
                    chunks,
                } => {
                    if let Some(file) = state.files.values_mut().find(|f| f.id == *file_id) {
                        file.hash = hash.clone();
                        file.repo_name = repo_name.clone();
                        file.last_commit = last_commit.clone();
                        file.updated_at = now;
                    }
                    state.chunks.insert(*file_id, chunks.clone());
                }
            }
        }

        if state.dims.is_none() {
            state.dims = mutations
                .iter()
                .flat_map(|m| m.chunks())
                .next()
                .map(|c| c.embedding.len());
        }
        Ok(())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<NearestChunk>> {
        let state = self.read()?;
        check_dims(state.dims, query.len())?;

        let mut candidates: Vec<NearestChunk> = state
            .files
            .values()
            .flat_map(|file| {
                state
                    .chunks
                    .get(&file.id)
                    .into_iter()
                    .flatten()
                    .map(move |chunk| NearestChunk {
                        file_path: file.path.clone(),
                        chunk_index: chunk.chunk_index,
                        content: chunk.content.clone(),
                        distance: l2_distance(query, &chunk.embedding),
                    })
            })
            .collect();

        sort_nearest(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = self.read()?.files.values().cloned().collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(files)
    }

    async fn chunks_for(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let state = self.read()?;
        let Some(file) = state.files.get(path) else {
            return Ok(Vec::new());
        };
        Ok(state
            .chunks
            .get(&file.id)
            .into_iter()
            .flatten()
            .map(|c| ChunkRecord {
                file_id: file.id,
                chunk_index: c.chunk_index,
                content: c.content.clone(),
            })
            .collect())
    }

    async fn delete_file(&self, path: &str) -> Result<bool> {
        let mut state = self.write()?;
        match state.files.remove(path) {
            Some(file) => {
                state.chunks.remove(&file.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
