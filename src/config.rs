//! TOML configuration parsing.
//!
//! The configuration is read once at process start and passed down
//! explicitly (see [`crate::context::AppContext`]); nothing re-reads it.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: BTreeSet<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub chunk: ChunkConfig,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            exclude_globs: Vec::new(),
            chunk: ChunkConfig::default(),
        }
    }
}

fn default_allowed_extensions() -> BTreeSet<String> {
    [".py", ".md", ".txt"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ChunkConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    1200
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            snippet_chars: default_snippet_chars(),
            max_fetch: default_max_fetch(),
        }
    }
}

fn default_snippet_chars() -> usize {
    500
}
fn default_max_fetch() -> usize {
    50
}

/// Per-provider overrides of the built-in registry entries.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderOverride {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
        }
    }
}

fn default_workers() -> usize {
    2
}
fn default_capacity() -> usize {
    64
}

/// A git repository tracked for automatic re-ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct RepoConfig {
    pub url: String,
    /// Checkout location, relative to the workspace root (or absolute inside it).
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub auto_update: bool,
}

pub fn default_branch() -> String {
    "main".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| Error::config(format!("failed to parse config file: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let chunk = &config.ingestion.chunk;
    if chunk.max_chars == 0 {
        return Err(Error::config("ingestion.chunk.max_chars must be > 0"));
    }
    if chunk.overlap >= chunk.max_chars {
        return Err(Error::config(format!(
            "ingestion.chunk.overlap ({}) must be smaller than max_chars ({})",
            chunk.overlap, chunk.max_chars
        )));
    }

    if config.ingestion.allowed_extensions.is_empty() {
        return Err(Error::config("ingestion.allowed_extensions must not be empty"));
    }

    if config.retrieval.max_fetch == 0 {
        return Err(Error::config("retrieval.max_fetch must be >= 1"));
    }

    if config.embedding.batch_size == 0 {
        return Err(Error::config("embedding.batch_size must be > 0"));
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                return Err(Error::config(format!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                )));
            }
            if matches!(config.embedding.dims, None | Some(0)) {
                return Err(Error::config(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                )));
            }
        }
        other => {
            return Err(Error::config(format!(
                "unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
                other
            )))
        }
    }

    for name in config.providers.keys() {
        if name.parse::<crate::providers::Provider>().is_err() {
            return Err(Error::config(format!(
                "unknown completion provider in [providers]: '{}'",
                name
            )));
        }
    }

    if config.queue.workers == 0 || config.queue.capacity == 0 {
        return Err(Error::config("queue.workers and queue.capacity must be >= 1"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/rag.sqlite"

[workspace]
root = "/workspace"
"#;

    #[test]
    fn test_minimal_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.ingestion.chunk.max_chars, 1200);
        assert_eq!(cfg.ingestion.chunk.overlap, 200);
        assert!(cfg.ingestion.allowed_extensions.contains(".md"));
        assert_eq!(cfg.retrieval.snippet_chars, 500);
        assert_eq!(cfg.retrieval.max_fetch, 50);
        assert!(!cfg.embedding.is_enabled());
        assert!(cfg.repos.is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max_chars() {
        let content = format!("{}\n[ingestion.chunk]\nmax_chars = 100\noverlap = 100\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_openai_embedding_requires_dims() {
        let content = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
            MINIMAL
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("dims"));
    }

    #[test]
    fn test_unknown_completion_provider_rejected() {
        let content = format!("{}\n[providers.anthropic]\nmodel = \"x\"\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_repos_parse() {
        let content = format!(
            "{}\n[[repos]]\nurl = \"https://github.com/org/docs.git\"\nauto_update = true\n",
            MINIMAL
        );
        let cfg = parse_config(&content).unwrap();
        assert_eq!(cfg.repos.len(), 1);
        assert_eq!(cfg.repos[0].branch, "main");
        assert!(cfg.repos[0].auto_update);
        assert!(cfg.repos[0].path.is_none());
    }
}
