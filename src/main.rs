//! # docs-rag CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and schema |
//! | `rag ingest <dir>` | Ingest a directory (relative to the workspace root) |
//! | `rag ingest-git <url>` | Clone or update a repository and ingest it |
//! | `rag search "<query>"` | Retrieval only |
//! | `rag ask "<query>"` | Retrieval + generated answer |
//! | `rag raw "<query>"` | Generated answer without retrieval |
//! | `rag files` | List indexed files |
//! | `rag remove <path>` | Delete a file and its chunks from the index |
//! | `rag serve` | Start the HTTP API and ingestion workers |
//!
//! Logs go to stderr (filter with `RUST_LOG`); results go to stdout.
//! `--json` prints results as JSON.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use docs_rag::answer::{rag_search, raw_search};
use docs_rag::config;
use docs_rag::context::AppContext;
use docs_rag::jobs::{run_job, IngestJob};
use docs_rag::models::{FileInfo, FilesResponse, IngestStats, SearchResponse, SearchResult};
use docs_rag::providers::Provider;
use docs_rag::search::{validate_query, SearchParams};
use docs_rag::server;

/// Retrieval-augmented answers over your documentation.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a directory. Unchanged files are skipped.
    Ingest {
        /// Directory, relative to the workspace root or absolute.
        dir: PathBuf,
        /// Repository name to record on ingested files.
        #[arg(long)]
        repo_name: Option<String>,
        /// Revision to record on ingested files.
        #[arg(long)]
        revision: Option<String>,
    },

    /// Clone or update a git repository, then ingest its working copy.
    IngestGit {
        url: String,
        #[arg(long, default_value = "main")]
        branch: String,
        /// Checkout location (default: `repos/<name>` under the workspace).
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Retrieve the chunks most similar to a query.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f64>,
    },

    /// Retrieve, then answer the query with a completion provider.
    Ask {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f64>,
        /// `openai`, `groq`, or `deepseek`.
        #[arg(long, default_value = "openai")]
        provider: Provider,
    },

    /// Answer the query with a completion provider, without retrieval.
    Raw {
        query: String,
        #[arg(long, default_value = "openai")]
        provider: Provider,
    },

    /// List indexed files, newest first.
    Files,

    /// Delete a file (and its chunks) from the index.
    Remove {
        /// Normalized path as shown by `rag files`.
        path: String,
    },

    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docs_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            AppContext::init_storage_only(cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            dir,
            repo_name,
            revision,
        } => {
            let ctx = AppContext::init(cfg).await?;
            let stats = ctx
                .coordinator
                .ingest(&dir, repo_name.as_deref(), revision.as_deref())
                .await?;
            print_stats(&stats, cli.json)?;
        }
        Commands::IngestGit { url, branch, path } => {
            let ctx = AppContext::init(cfg).await?;
            let job = IngestJob::Git { url, branch, path };
            let stats = run_job(&ctx.coordinator, &job).await?;
            print_stats(&stats, cli.json)?;
        }
        Commands::Search {
            query,
            top_k,
            min_similarity,
        } => {
            let params = SearchParams::new(&query, top_k, min_similarity)?;
            let ctx = AppContext::init(cfg).await?;
            let (results, metrics) = ctx.engine.search(&params).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&SearchResponse {
                        results,
                        retrieval_metrics: metrics,
                    })?
                );
            } else {
                print_results(&results);
                println!(
                    "\n{} result(s), {} filtered, {:.1} ms",
                    metrics.results_returned, metrics.results_filtered, metrics.latency_ms
                );
            }
        }
        Commands::Ask {
            query,
            top_k,
            min_similarity,
            provider,
        } => {
            let params = SearchParams::new(&query, top_k, min_similarity)?;
            let ctx = AppContext::init(cfg).await?;
            let response = rag_search(&ctx.engine, &ctx.orchestrator, &params, provider).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}\n", response.answer.trim());
                println!("Sources:");
                print_results(&response.results);
                let g = &response.generation_metrics;
                println!(
                    "\n{} source file(s), ~{} context tokens, {:.1} ms generation",
                    g.sources_used, g.context_tokens, g.llm_latency_ms
                );
            }
        }
        Commands::Raw { query, provider } => {
            validate_query(&query)?;
            let ctx = AppContext::init_storage_only(cfg).await?;
            let response = raw_search(&ctx.orchestrator, &query, provider).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer.trim());
            }
        }
        Commands::Files => {
            let ctx = AppContext::init_storage_only(cfg).await?;
            let files: Vec<FileInfo> = ctx.index.list_files().await?.iter().map(FileInfo::from).collect();
            if cli.json {
                let response = FilesResponse {
                    total: files.len(),
                    files,
                };
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if files.is_empty() {
                println!("No files indexed.");
            } else {
                for file in &files {
                    println!(
                        "{:>5}  {}  {}  {}  {}",
                        file.id,
                        &file.hash[..file.hash.len().min(12)],
                        file.created_at.as_deref().unwrap_or("-"),
                        file.repo_name.as_deref().unwrap_or("-"),
                        file.path
                    );
                }
                println!("\n{} file(s)", files.len());
            }
        }
        Commands::Remove { path } => {
            let ctx = AppContext::init_storage_only(cfg).await?;
            if ctx.index.delete_file(&path).await? {
                println!("Removed {}", path);
            } else {
                anyhow::bail!("not indexed: {}", path);
            }
        }
        Commands::Serve => {
            let ctx = AppContext::init(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}

fn print_stats(stats: &IngestStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
    } else {
        println!(
            "new: {}  updated: {}  skipped: {}  total: {}",
            stats.new_files, stats.updated_files, stats.skipped_files, stats.total_files
        );
    }
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let preview: String = r.content_snippet.chars().take(160).collect();
        println!(
            "{}. [{:.3}] {}#{}\n   {}",
            i + 1,
            r.similarity,
            r.file_path,
            r.chunk_index,
            preview
        );
    }
}
