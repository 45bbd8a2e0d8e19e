//! Schema creation and index metadata checks.
//!
//! Every statement is idempotent, so running migrations on each startup is
//! safe. Anything other than "already exists" is a fatal startup error.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

const META_DIMS: &str = "embedding_dims";
const META_MODEL: &str = "embedding_model";

/// Create tables if absent and pin the index to one embedding dimensionality.
///
/// `embedding` is `(model, dims)` of the active embedder, or `None` when
/// embeddings are disabled. The first enabled run records the pair; a later
/// run with a different `dims` is rejected, since mixed dimensionalities
/// make distances meaningless.
pub async fn run_migrations(pool: &SqlitePool, embedding: Option<(&str, usize)>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            hash TEXT NOT NULL,
            repo_name TEXT,
            last_commit TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(file_id, chunk_index),
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at DESC)")
        .execute(pool)
        .await?;

    if let Some((model, dims)) = embedding {
        pin_embedding(pool, model, dims).await?;
    }

    Ok(())
}

async fn pin_embedding(pool: &SqlitePool, model: &str, dims: usize) -> Result<()> {
    let stored_dims = get_meta(pool, META_DIMS).await?;

    match stored_dims {
        None => {
            set_meta(pool, META_DIMS, &dims.to_string()).await?;
            set_meta(pool, META_MODEL, model).await?;
        }
        Some(value) => {
            let expected: usize = value.parse().map_err(|_| {
                Error::config(format!("corrupt index metadata: {} = '{}'", META_DIMS, value))
            })?;
            if expected != dims {
                return Err(Error::config(format!(
                    "index was built with {}-dimensional embeddings but the configured model \
                     produces {}; rebuild the index or switch back",
                    expected, dims
                )));
            }
            if let Some(stored_model) = get_meta(pool, META_MODEL).await? {
                if stored_model != model {
                    tracing::warn!(
                        stored = %stored_model,
                        configured = %model,
                        "embedding model changed; existing vectors were produced by a different model"
                    );
                }
            }
        }
    }

    Ok(())
}

/// Dimensionality recorded for this index, if any.
pub async fn indexed_dims(pool: &SqlitePool) -> Result<Option<usize>> {
    Ok(get_meta(pool, META_DIMS)
        .await?
        .and_then(|v| v.parse::<usize>().ok()))
}

async fn get_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

async fn set_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO index_meta (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_migrations_idempotent_and_pin_dims() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&dir.path().join("rag.sqlite")).await.unwrap();

        run_migrations(&pool, None).await.unwrap();
        run_migrations(&pool, None).await.unwrap();
        assert_eq!(indexed_dims(&pool).await.unwrap(), None);

        run_migrations(&pool, Some(("m", 4))).await.unwrap();
        assert_eq!(indexed_dims(&pool).await.unwrap(), Some(4));
        run_migrations(&pool, Some(("m", 4))).await.unwrap();

        let err = run_migrations(&pool, Some(("other", 8))).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        pool.close().await;
    }
}
