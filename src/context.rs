//! Process-wide application context.
//!
//! Built once at startup from the parsed [`Config`] and handed to every
//! command and request handler. It owns the single embedding client, the
//! connection pool, and the components wired on top of them; nothing is
//! resolved lazily from global state.

use std::sync::Arc;

use crate::answer::AnswerOrchestrator;
use crate::completion::{ChatBackend, HttpChatBackend};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, DisabledEmbedder, EmbeddingClient};
use crate::error::Result;
use crate::index::sqlite::SqliteIndex;
use crate::index::VectorIndex;
use crate::ingest::IngestionCoordinator;
use crate::migrate;
use crate::providers::ProviderRegistry;
use crate::search::RetrievalEngine;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub coordinator: Arc<IngestionCoordinator>,
    pub engine: Arc<RetrievalEngine>,
    pub orchestrator: Arc<AnswerOrchestrator>,
}

impl AppContext {
    /// Full initialization: load the embedding model, open and migrate the
    /// database. Any failure here is fatal.
    pub async fn init(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding).await?;
        Self::open(config, embedder).await
    }

    /// Open the index without loading an embedding model, for commands
    /// that never embed (`init`, `files`, `remove`, `raw`).
    pub async fn init_storage_only(config: Config) -> Result<Self> {
        Self::open(config, Arc::new(DisabledEmbedder)).await
    }

    async fn open(config: Config, embedder: Arc<dyn EmbeddingClient>) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let pin = config
            .embedding
            .is_enabled()
            .then(|| (embedder.model_name(), embedder.dims()))
            .filter(|(_, dims)| *dims > 0);
        migrate::run_migrations(&pool, pin).await?;

        let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::open(pool).await?);
        Self::from_parts(config, index, embedder, Arc::new(HttpChatBackend::new()?))
    }

    /// Wire components over explicit collaborators.
    pub fn from_parts(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        let coordinator = Arc::new(IngestionCoordinator::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            &config,
        )?);
        let engine = Arc::new(RetrievalEngine::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            config.retrieval.snippet_chars,
            config.retrieval.max_fetch,
        ));
        let registry = ProviderRegistry::from_overrides(&config.providers)?;
        let orchestrator = Arc::new(AnswerOrchestrator::new(registry, backend));

        Ok(Self {
            config: Arc::new(config),
            index,
            embedder,
            coordinator,
            engine,
            orchestrator,
        })
    }
}
