//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest/fs` | Queue ingestion of a workspace directory |
//! | `POST` | `/ingest/git` | Queue clone/update + ingestion of a repository |
//! | `POST` | `/search` | Retrieval only |
//! | `POST` | `/search/rag` | Retrieval + generated answer |
//! | `POST` | `/search/raw` | Generated answer with no retrieval |
//! | `GET`  | `/files` | Indexed files, newest first |
//! | `GET`  | `/health` | Liveness and version |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! | Error | Status | Code |
//! |-------|--------|------|
//! | validation | 400 | `bad_request` |
//! | configuration (e.g. missing API key) | 400 | `configuration_error` |
//! | embedding / completion service | 502 | `upstream_error` |
//! | I/O, storage | 500 | `io_error` / `internal` |
//!
//! CORS is fully permissive so browser frontends can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{rag_search, raw_search};
use crate::connector_git::repo_name_from_url;
use crate::context::AppContext;
use crate::error::Error;
use crate::jobs::{enqueue_auto_update_repos, IngestJob, JobQueue};
use crate::models::{
    FileInfo, FilesResponse, RagSearchResponse, RawSearchResponse, SearchResponse,
};
use crate::providers::Provider;
use crate::search::{validate_query, SearchParams};

#[derive(Clone)]
struct AppState {
    ctx: AppContext,
    queue: JobQueue,
}

/// Start the worker pool, queue auto-update repositories, and serve until
/// the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let (queue, _workers) = JobQueue::start(&ctx.config.queue, ctx.coordinator.clone());

    enqueue_auto_update_repos(&queue, &ctx.config.repos).await?;

    let app = router(ctx, queue);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// All routes over `ctx`, with jobs sent to `queue`.
pub fn router(ctx: AppContext, queue: JobQueue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest/fs", post(handle_ingest_fs))
        .route("/ingest/git", post(handle_ingest_git))
        .route("/search", post(handle_search))
        .route("/search/rag", post(handle_search_rag))
        .route("/search/raw", post(handle_search_raw))
        .route("/files", get(handle_files))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { ctx, queue })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::Configuration(_) | Error::DimensionMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Io { .. } | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: rejection.body_text(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

fn parse_provider(provider: Option<&str>) -> Result<Provider, Error> {
    provider
        .map(str::parse::<Provider>)
        .transpose()
        .map(Option::unwrap_or_default)
}

// ============ Ingestion ============

#[derive(Deserialize)]
struct IngestFsRequest {
    path: String,
    #[serde(default)]
    repo_name: Option<String>,
    #[serde(default)]
    revision: Option<String>,
}

#[derive(Serialize)]
struct IngestFsResponse {
    queued: bool,
    job_id: String,
    path: String,
}

async fn handle_ingest_fs(
    State(state): State<AppState>,
    payload: Result<Json<IngestFsRequest>, JsonRejection>,
) -> ApiResult<IngestFsResponse> {
    let Json(req) = payload?;
    // Paths are always workspace-relative.
    let rel_path = req.path.trim_start_matches('/').to_string();
    if rel_path.split('/').any(|part| part == "..") {
        return Err(Error::validation("path must stay inside the workspace").into());
    }

    let job_id = state
        .queue
        .enqueue(IngestJob::Filesystem {
            path: PathBuf::from(&rel_path),
            repo_name: req.repo_name,
            revision: req.revision,
        })
        .await?;

    Ok(Json(IngestFsResponse {
        queued: true,
        job_id,
        path: rel_path,
    }))
}

#[derive(Deserialize)]
struct IngestGitRequest {
    repo_url: String,
    /// Checkout directory name under `repos/`; derived from the URL if absent.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Serialize)]
struct IngestGitResponse {
    queued: bool,
    job_id: String,
    repo_url: String,
    branch: String,
}

async fn handle_ingest_git(
    State(state): State<AppState>,
    payload: Result<Json<IngestGitRequest>, JsonRejection>,
) -> ApiResult<IngestGitResponse> {
    let Json(req) = payload?;
    if req.repo_url.trim().is_empty() {
        return Err(Error::validation("repo_url must not be empty").into());
    }
    let branch = req
        .branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(crate::config::default_branch);
    let path = req
        .name
        .map(|name| PathBuf::from("repos").join(repo_name_from_url(&name)));

    let job_id = state
        .queue
        .enqueue(IngestJob::Git {
            url: req.repo_url.clone(),
            branch: branch.clone(),
            path,
        })
        .await?;

    Ok(Json(IngestGitResponse {
        queued: true,
        job_id,
        repo_url: req.repo_url,
        branch,
    }))
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default)]
    min_similarity: Option<f64>,
    #[serde(default)]
    provider: Option<String>,
}

impl SearchRequest {
    fn params(&self) -> Result<SearchParams, Error> {
        let top_k = self.top_k.map(|k| usize::try_from(k).unwrap_or(0));
        SearchParams::new(&self.query, top_k, self.min_similarity)
    }
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<SearchResponse> {
    let Json(req) = payload?;
    let params = req.params()?;
    let (results, retrieval_metrics) = state.ctx.engine.search(&params).await?;
    Ok(Json(SearchResponse {
        results,
        retrieval_metrics,
    }))
}

async fn handle_search_rag(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<RagSearchResponse> {
    let Json(req) = payload?;
    let params = req.params()?;
    let provider = parse_provider(req.provider.as_deref())?;
    let response = rag_search(&state.ctx.engine, &state.ctx.orchestrator, &params, provider).await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct RawSearchRequest {
    query: String,
    #[serde(default)]
    provider: Option<String>,
}

async fn handle_search_raw(
    State(state): State<AppState>,
    payload: Result<Json<RawSearchRequest>, JsonRejection>,
) -> ApiResult<RawSearchResponse> {
    let Json(req) = payload?;
    validate_query(&req.query)?;
    let provider = parse_provider(req.provider.as_deref())?;
    let response = raw_search(&state.ctx.orchestrator, &req.query, provider).await?;
    Ok(Json(response))
}

// ============ Files / health ============

async fn handle_files(State(state): State<AppState>) -> ApiResult<FilesResponse> {
    let records = state.ctx.index.list_files().await?;
    let files: Vec<FileInfo> = records.iter().map(FileInfo::from).collect();
    Ok(Json(FilesResponse {
        total: files.len(),
        files,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
