//! # docs-rag
//!
//! Retrieval-augmented question answering over engineering documentation
//! and source trees.
//!
//! Files are split into overlapping chunks, embedded, and stored in SQLite.
//! Queries are embedded the same way, matched against stored chunks by
//! Euclidean distance, and optionally handed to a completion provider
//! together with the best-matching chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────┐
//! │ FS / Git     │──▶│ Ingestion          │──▶│  SQLite   │
//! │ (workspace)  │   │ fingerprint+chunk  │   │ files +   │
//! └──────────────┘   │ +embed             │   │ chunks    │
//!                    └────────────────────┘   └────┬─────┘
//!                                                  │
//!                    ┌────────────────────┐        │
//!   query ──────────▶│ Retrieval          │◀───────┘
//!                    └─────────┬──────────┘
//!                              ▼
//!                    ┌────────────────────┐
//!                    │ Answer (openai /   │
//!                    │ groq / deepseek)   │
//!                    └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag ingest docs
//! rag search "how are migrations run?"
//! rag ask "how are migrations run?" --provider groq
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Records and response shapes |
//! | [`chunk`] | Overlapping text windows |
//! | [`fingerprint`] | SHA-256 content digests |
//! | [`embedding`] | Embedding client abstraction |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`index`] | Vector index abstraction and backends |
//! | [`ingest`] | Incremental directory ingestion |
//! | [`connector_git`] | Git working copies |
//! | [`search`] | Similarity retrieval |
//! | [`providers`] / [`completion`] | Completion providers and transport |
//! | [`answer`] | Prompt assembly and RAG responses |
//! | [`jobs`] | Background ingestion queue |
//! | [`context`] | Process-wide wiring |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod connector_git;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod ingest;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod providers;
pub mod search;
pub mod server;
