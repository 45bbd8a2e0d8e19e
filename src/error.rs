//! Error taxonomy shared by ingestion, retrieval, and generation.
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | [`Error::Configuration`] | missing credential, unknown provider, invalid chunk parameters | never |
//! | [`Error::Io`] | unreadable file or missing directory | never |
//! | [`Error::Upstream`] | embedding service or completion API failure | never |
//! | [`Error::Validation`] | empty query or out-of-range parameter | never |
//! | [`Error::Storage`] | SQLite failure | never |
//!
//! During batch ingestion only a missing ingestion root is fatal; per-file
//! I/O and upstream failures are logged and counted as skipped.

use std::path::PathBuf;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Error::Upstream(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::Io { .. } => "io_error",
            Error::Upstream(_) => "upstream_error",
            Error::Validation(_) => "bad_request",
            Error::DimensionMismatch { .. } => "configuration_error",
            Error::Storage(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}
