//! Database connection pool and catalog schema.
//!
//! The catalog is a single-file embedded SQLite store. The schema mirrors
//! the two relations of the registry: `model_files` (one row per unique
//! SHA-256) and `model_aliases` (secondary filenames pointing at a hash).

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

/// Create the SQLite connection pool, creating the database file and its
/// parent directory when missing, and initialize the schema.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create catalog tables and indexes when absent.
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_files (
            sha256 TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            source_url TEXT,
            metadata TEXT,
            date_added TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_aliases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sha256 TEXT NOT NULL,
            alias_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (sha256) REFERENCES model_files(sha256),
            UNIQUE(alias_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_aliases_sha256 ON model_aliases(sha256)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_path ON model_files(file_path)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_pool_initializes_schema() {
        let temp = TempDir::new().unwrap();
        let pool = create_pool(&temp.path().join(".registry/catalog.db"))
            .await
            .unwrap();

        // Schema is idempotent and queryable
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_files")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn reopen_preserves_rows() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("catalog.db");

        {
            let pool = create_pool(&db_path).await.unwrap();
            sqlx::query(
                "INSERT INTO model_files (sha256, file_path, size_bytes, date_added) \
                 VALUES ('aa', 'checkpoints/a.safetensors', 10, '2024-01-01T00:00:00Z')",
            )
            .execute(&pool)
            .await
            .unwrap();
            pool.close().await;
        }

        let pool = create_pool(&db_path).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_files")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
