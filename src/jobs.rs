//! Background ingestion work queue.
//!
//! Ingestion requests from the HTTP layer become [`IngestJob`]s on a bounded
//! tokio mpsc channel. A fixed pool of worker tasks drains the channel and
//! runs each job to completion with [`run_job`]; the ingestion functions
//! themselves know nothing about the queue.
//!
//! ```text
//! POST /ingest/* ──▶ JobQueue::enqueue ──▶ [bounded channel] ──▶ worker 0..N ──▶ run_job
//! ```
//!
//! A full channel applies backpressure: `enqueue` waits for a free slot.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{QueueConfig, RepoConfig};
use crate::connector_git;
use crate::error::{Error, Result};
use crate::ingest::IngestionCoordinator;
use crate::models::IngestStats;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IngestJob {
    /// Ingest a directory (relative paths resolve against the workspace root).
    Filesystem {
        path: PathBuf,
        repo_name: Option<String>,
        revision: Option<String>,
    },
    /// Clone or update a repository, then ingest its working copy.
    Git {
        url: String,
        branch: String,
        path: Option<PathBuf>,
    },
}

impl IngestJob {
    pub fn from_repo(repo: &RepoConfig) -> Self {
        IngestJob::Git {
            url: repo.url.clone(),
            branch: repo.branch.clone(),
            path: repo.path.as_ref().map(PathBuf::from),
        }
    }
}

#[derive(Debug)]
struct QueuedJob {
    id: String,
    job: IngestJob,
}

/// Sending half of the work queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl JobQueue {
    /// Create the channel and spawn `config.workers` consumers.
    pub fn start(
        config: &QueueConfig,
        coordinator: Arc<IngestionCoordinator>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(worker_loop(worker, rx, coordinator))
            })
            .collect();

        (Self { tx }, workers)
    }

    /// Queue `job` and return its id.
    pub async fn enqueue(&self, job: IngestJob) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(job_id = %id, ?job, "job queued");
        self.tx
            .send(QueuedJob {
                id: id.clone(),
                job,
            })
            .await
            .map_err(|_| Error::upstream("job queue is shut down"))?;
        Ok(id)
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    coordinator: Arc<IngestionCoordinator>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let next = rx.lock().await.recv().await;
        let Some(QueuedJob { id, job }) = next else {
            tracing::debug!(worker, "job queue closed; worker exiting");
            return;
        };

        tracing::info!(worker, job_id = %id, "job started");
        match run_job(&coordinator, &job).await {
            Ok(stats) => tracing::info!(
                worker,
                job_id = %id,
                new = stats.new_files,
                updated = stats.updated_files,
                skipped = stats.skipped_files,
                "job finished"
            ),
            Err(e) => tracing::error!(worker, job_id = %id, error = %e, "job failed"),
        }
    }
}

/// Execute one job synchronously.
pub async fn run_job(coordinator: &IngestionCoordinator, job: &IngestJob) -> Result<IngestStats> {
    match job {
        IngestJob::Filesystem {
            path,
            repo_name,
            revision,
        } => {
            coordinator
                .ingest(path, repo_name.as_deref(), revision.as_deref())
                .await
        }
        IngestJob::Git { url, branch, path } => {
            let dest = checkout_dir(coordinator.workspace_root(), url, path.as_deref());
            let checkout = connector_git::acquire(url, branch, &dest).await?;
            coordinator
                .ingest(
                    &checkout.dir,
                    Some(&checkout.repo_name),
                    checkout.revision.as_deref(),
                )
                .await
        }
    }
}

/// Where the working copy for `url` lives.
pub fn checkout_dir(workspace_root: &Path, url: &str, path: Option<&Path>) -> PathBuf {
    match path {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => workspace_root.join(p),
        None => connector_git::default_checkout_dir(workspace_root, url),
    }
}

/// Queue every configured repository with `auto_update = true`.
pub async fn enqueue_auto_update_repos(queue: &JobQueue, repos: &[RepoConfig]) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for repo in repos.iter().filter(|r| r.auto_update) {
        ids.push(queue.enqueue(IngestJob::from_repo(repo)).await?);
    }
    if !ids.is_empty() {
        tracing::info!(count = ids.len(), "queued auto-update repositories");
    }
    Ok(ids)
}
