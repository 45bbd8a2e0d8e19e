//! SQLite-backed [`VectorIndex`].
//!
//! Embeddings are stored as little-endian `f32` BLOBs next to their chunk
//! text. Nearest-neighbour search is a brute-force scan: every embedding is
//! decoded and compared with the query in-process. That keeps the store
//! dependency-free and is fast enough for the corpora this tool targets.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{check_batch, check_dims, l2_distance, sort_nearest, FileMutation, VectorIndex};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::migrate;
use crate::models::{ChunkRecord, FileRecord, NearestChunk, NewChunk};

const UNPINNED: usize = 0;

pub struct SqliteIndex {
    pool: SqlitePool,
    // 0 while no dimensionality is pinned yet.
    dims: AtomicUsize,
}

impl SqliteIndex {
    /// Wrap a migrated pool, picking up the pinned dimensionality if any.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let dims = migrate::indexed_dims(&pool).await?.unwrap_or(UNPINNED);
        Ok(Self {
            pool,
            dims: AtomicUsize::new(dims),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn dims(&self) -> Option<usize> {
        match self.dims.load(Ordering::Relaxed) {
            UNPINNED => None,
            d => Some(d),
        }
    }
}

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        path: row.get("path"),
        hash: row.get("hash"),
        repo_name: row.get("repo_name"),
        last_commit: row.get("last_commit"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn insert_chunks(conn: &mut SqliteConnection, file_id: i64, chunks: &[NewChunk]) -> Result<()> {
    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (file_id, chunk_index, content, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(vec_to_blob(&chunk.embedding))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn find_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT id, path, hash, repo_name, last_commit, created_at, updated_at \
             FROM files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_file))
    }

    async fn apply(&self, mutations: &[FileMutation]) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        check_batch(self.dims(), mutations)?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for mutation in mutations {
            match mutation {
                FileMutation::Create {
                    path,
                    hash,
                    repo_name,
                    last_commit,
                    chunks,
                } => {
                    let file_id = sqlx::query(
                        "INSERT INTO files (path, hash, repo_name, last_commit, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(path)
                    .bind(hash)
                    .bind(repo_name)
                    .bind(last_commit)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();

                    insert_chunks(&mut tx, file_id, chunks).await?;
                }
                FileMutation::Replace {
                    file_id,
                    hash,
                    repo_name,
                    last_commit,
                    chunks,
                } => {
                    sqlx::query("DELETE FROM chunks WHERE file_id = ?")
                        .bind(file_id)
                        .execute(&mut *tx)
                        .await?;

                    sqlx::query(
                        "UPDATE files SET hash = ?, repo_name = ?, last_commit = ?, updated_at = ? \
                         WHERE id = ?",
                    )
                    .bind(hash)
                    .bind(repo_name)
                    .bind(last_commit)
                    .bind(now)
                    .bind(file_id)
                    .execute(&mut *tx)
                    .await?;

                    insert_chunks(&mut tx, *file_id, chunks).await?;
                }
            }
        }

        tx.commit().await?;

        if self.dims().is_none() {
            if let Some(first) = mutations.iter().flat_map(|m| m.chunks()).next() {
                self.dims.store(first.embedding.len(), Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<NearestChunk>> {
        check_dims(self.dims(), query.len())?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT f.path, c.chunk_index, c.content, c.embedding \
             FROM chunks c JOIN files f ON f.id = c.file_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            if vector.len() != query.len() {
                tracing::warn!(
                    path = %row.get::<String, _>("path"),
                    "skipping chunk with mismatched embedding length"
                );
                continue;
            }
            candidates.push(NearestChunk {
                file_path: row.get("path"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                distance: l2_distance(query, &vector),
            });
        }

        sort_nearest(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, path, hash, repo_name, last_commit, created_at, updated_at \
             FROM files ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    async fn chunks_for(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT c.file_id, c.chunk_index, c.content \
             FROM chunks c JOIN files f ON f.id = c.file_id \
             WHERE f.path = ? ORDER BY c.chunk_index",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkRecord {
                file_id: row.get("file_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
            })
            .collect())
    }

    async fn delete_file(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
