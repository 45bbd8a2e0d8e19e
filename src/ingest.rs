//! Incremental ingestion of a directory tree into the vector index.
//!
//! # Pipeline
//!
//! ```text
//! walk root ──▶ filter (extension, excludes) ──▶ sort by normalized path
//!      ──▶ lock paths ──▶ per file: fingerprint ─┬─ unchanged ──▶ skip
//!                                                └─ new/changed ──▶ read ──▶ chunk ──▶ embed ──▶ plan
//!      ──▶ apply every planned mutation in one transaction
//! ```
//!
//! Per-file failures (unreadable file, zero chunks, embedding error) are
//! logged and counted in `skipped_files`; only a missing ingestion root
//! fails the whole call. Planned mutations are committed together at the
//! end of the walk, so a failure while committing leaves the index as it was.
//!
//! Files are identified by their path relative to the workspace root,
//! joined with `/`. Each path is locked for the duration of a batch, so two
//! concurrent batches touching the same file are serialized rather than
//! interleaving their delete/insert sequences.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

use crate::chunk::chunk_with;
use crate::config::{ChunkConfig, Config};
use crate::embedding::{embed_batched, EmbeddingClient};
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint_file;
use crate::index::{FileMutation, VectorIndex};
use crate::models::{IngestStats, NewChunk};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Advisory per-path locks shared by every batch of one coordinator.
#[derive(Default)]
struct PathLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    /// Lock every path in `paths`, which must be sorted. Acquiring in a
    /// global order keeps overlapping batches from deadlocking.
    async fn acquire(&self, paths: &[String]) -> Result<PathLease<'_>> {
        let handles: Vec<Arc<tokio::sync::Mutex<()>>> = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| Error::config("path lock table poisoned"))?;
            paths
                .iter()
                .map(|p| Arc::clone(map.entry(p.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        Ok(PathLease {
            locks: self,
            guards,
        })
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }
}

/// Held path locks. Dropping the lease releases them and forgets every
/// path nobody else is holding or waiting on.
struct PathLease<'a> {
    locks: &'a PathLocks,
    guards: Vec<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        if let Ok(mut map) = self.locks.inner.lock() {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }
}

/// A file selected by the walk.
struct Candidate {
    abs_path: PathBuf,
    path: String,
}

enum Decision {
    Unchanged,
    Skipped,
    Create(FileMutation),
    Replace(FileMutation),
}

/// Walks directories and keeps the index in step with their contents.
pub struct IngestionCoordinator {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    workspace_root: PathBuf,
    extensions: BTreeSet<String>,
    excludes: GlobSet,
    chunk: ChunkConfig,
    batch_size: usize,
    locks: PathLocks,
}

impl IngestionCoordinator {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        config: &Config,
    ) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(config.ingestion.exclude_globs.iter().cloned());

        Ok(Self {
            index,
            embedder,
            workspace_root: canonical_or_self(&config.workspace.root),
            extensions: config
                .ingestion
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            excludes: build_globset(&patterns)?,
            chunk: config.ingestion.chunk,
            batch_size: config.embedding.batch_size,
            locks: PathLocks::default(),
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Ingest every eligible file under `root`.
    ///
    /// A relative `root` is resolved against the workspace root. `repo_name`
    /// and `revision` are recorded on created files; on updated files they
    /// replace the stored values only when given.
    pub async fn ingest(
        &self,
        root: &Path,
        repo_name: Option<&str>,
        revision: Option<&str>,
    ) -> Result<IngestStats> {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            self.workspace_root.join(root)
        };
        if !root.is_dir() {
            return Err(Error::io(
                &root,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "ingestion root does not exist or is not a directory",
                ),
            ));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;

        let candidates = self.discover(&root);
        let paths: Vec<String> = candidates.iter().map(|c| c.path.clone()).collect();
        let _lease = self.locks.acquire(&paths).await?;

        let mut stats = IngestStats {
            total_files: candidates.len() as u64,
            ..IngestStats::default()
        };
        let mut batch = Vec::new();

        for candidate in &candidates {
            match self.decide(candidate, repo_name, revision).await? {
                Decision::Unchanged | Decision::Skipped => stats.skipped_files += 1,
                Decision::Create(mutation) => {
                    stats.new_files += 1;
                    batch.push(mutation);
                }
                Decision::Replace(mutation) => {
                    stats.updated_files += 1;
                    batch.push(mutation);
                }
            }
        }

        self.index.apply(&batch).await?;

        tracing::info!(
            root = %root.display(),
            new = stats.new_files,
            updated = stats.updated_files,
            skipped = stats.skipped_files,
            total = stats.total_files,
            "ingestion complete"
        );
        Ok(stats)
    }

    /// Eligible files under `root`, sorted by normalized path.
    fn discover(&self, root: &Path) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let abs_path = entry.path();
            let relative_to_root = abs_path.strip_prefix(root).unwrap_or(abs_path);
            if self.excludes.is_match(relative_to_root) {
                continue;
            }
            if !self.has_allowed_extension(abs_path) {
                continue;
            }

            candidates.push(Candidate {
                abs_path: abs_path.to_path_buf(),
                path: self.normalize(abs_path),
            });
        }

        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        candidates.dedup_by(|a, b| a.path == b.path);
        candidates
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&normalize_extension(e)))
            .unwrap_or(false)
    }

    /// Path relative to the workspace root, `/`-separated. Files outside
    /// the workspace keep their full path. Both sides are canonical, so a
    /// file has one identity however its directory was named.
    fn normalize(&self, abs_path: &Path) -> String {
        let relative = abs_path
            .strip_prefix(&self.workspace_root)
            .unwrap_or(abs_path);
        join_components(relative)
    }

    async fn decide(
        &self,
        candidate: &Candidate,
        repo_name: Option<&str>,
        revision: Option<&str>,
    ) -> Result<Decision> {
        let hash = match fingerprint_file(&candidate.abs_path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(path = %candidate.path, error = %e, "skipping unreadable file");
                return Ok(Decision::Skipped);
            }
        };

        let existing = self.index.find_file(&candidate.path).await?;
        if let Some(file) = &existing {
            if file.hash == hash {
                tracing::debug!(path = %candidate.path, "unchanged");
                return Ok(Decision::Unchanged);
            }
        }

        let bytes = match std::fs::read(&candidate.abs_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %candidate.path, error = %e, "skipping unreadable file");
                return Ok(Decision::Skipped);
            }
        };
        let text = String::from_utf8_lossy(&bytes);

        let pieces = chunk_with(&text, &self.chunk)?;
        if pieces.is_empty() {
            tracing::debug!(path = %candidate.path, "no chunks; skipping");
            return Ok(Decision::Skipped);
        }

        let vectors = match embed_batched(self.embedder.as_ref(), &pieces, self.batch_size).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!(path = %candidate.path, error = %e, "embedding failed; skipping");
                return Ok(Decision::Skipped);
            }
        };
        let expected_dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dims) {
            tracing::warn!(
                path = %candidate.path,
                expected = expected_dims,
                actual = bad.len(),
                "embedding has wrong dimensionality; skipping"
            );
            return Ok(Decision::Skipped);
        }

        let chunks: Vec<NewChunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (content, embedding))| NewChunk {
                chunk_index: i as i64,
                content,
                embedding,
            })
            .collect();

        Ok(match existing {
            None => {
                tracing::debug!(path = %candidate.path, chunks = chunks.len(), "new");
                Decision::Create(FileMutation::Create {
                    path: candidate.path.clone(),
                    hash,
                    repo_name: repo_name.map(str::to_string),
                    last_commit: revision.map(str::to_string),
                    chunks,
                })
            }
            Some(file) => {
                tracing::debug!(path = %candidate.path, chunks = chunks.len(), "changed");
                Decision::Replace(FileMutation::Replace {
                    file_id: file.id,
                    hash,
                    repo_name: repo_name.map(str::to_string).or(file.repo_name),
                    last_commit: revision.map(str::to_string).or(file.last_commit),
                    chunks,
                })
            }
        })
    }
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.').to_lowercase())
}

fn join_components(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::RootDir => Some(String::new()),
            Component::CurDir | Component::Prefix(_) => None,
        })
        .collect();
    parts.join("/")
}

/// The workspace may not exist yet when the coordinator is built (e.g.
/// before the first clone); it is then used as given.
fn canonical_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".MD"), ".md");
        assert_eq!(normalize_extension("txt"), ".txt");
    }

    #[test]
    fn test_join_components() {
        assert_eq!(join_components(Path::new("docs/guide/a.md")), "docs/guide/a.md");
        assert_eq!(join_components(Path::new("./docs/a.md")), "docs/a.md");
        assert_eq!(join_components(Path::new("/abs/a.md")), "/abs/a.md");
        assert_eq!(join_components(Path::new("../notes/a.md")), "../notes/a.md");
    }

    #[test]
    fn test_default_excludes_match_nested_dirs() {
        let patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        let set = build_globset(&patterns).unwrap();
        assert!(set.is_match("repo/.git/config"));
        assert!(set.is_match("a/node_modules/x/readme.md"));
        assert!(!set.is_match("docs/readme.md"));
    }

    #[test]
    fn test_bad_glob_is_configuration_error() {
        let err = build_globset(&["a/[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_path_locks_serialize_same_path() {
        let locks = Arc::new(PathLocks::default());
        let paths = vec!["a.md".to_string(), "b.md".to_string()];
        let lease = locks.acquire(&paths).await.unwrap();

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let lease = locks2.acquire(&["b.md".to_string()]).await.unwrap();
            lease.guards.len()
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(lease);
        // "b.md" is still wanted by the waiter.
        assert_eq!(locks.len(), 1);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_path_locks_are_forgotten_after_release() {
        let locks = PathLocks::default();
        for batch in 0..10 {
            let paths = vec![format!("batch-{}/a.md", batch), format!("batch-{}/b.md", batch)];
            let lease = locks.acquire(&paths).await.unwrap();
            assert_eq!(locks.len(), 2);
            drop(lease);
        }
        assert_eq!(locks.len(), 0);
    }
}
