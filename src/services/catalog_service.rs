//! Catalog service - durable hash-indexed registry of model files.
//!
//! Wraps the SQLite catalog with the two relations described by the data
//! model: `model_files` keyed by SHA-256 and `model_aliases` for secondary
//! filenames. Writers serialize on the connection pool's single writer;
//! inserts are idempotent. No locks are held across filesystem operations.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::Result;
use crate::models::{ModelAlias, ModelFile, NewModelFile, RegistryStats};

/// Streaming read buffer for file hashing (1 MiB).
const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Catalog over the embedded SQLite store.
#[derive(Clone)]
pub struct CatalogService {
    db: SqlitePool,
}

impl CatalogService {
    /// Create a new catalog service over an initialized pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Find a model by SHA-256 hash.
    pub async fn get_by_hash(&self, sha256: &str) -> Result<Option<ModelFile>> {
        let row = sqlx::query_as::<_, ModelFile>(
            "SELECT sha256, file_path, size_bytes, source_url, metadata, date_added \
             FROM model_files WHERE sha256 = ?1",
        )
        .bind(sha256)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    /// Find a model by base-relative path, checking canonical paths first
    /// and then aliases. The flag is true when the path is the canonical one.
    pub async fn get_by_path(&self, rel_path: &str) -> Result<Option<(ModelFile, bool)>> {
        let canonical = sqlx::query_as::<_, ModelFile>(
            "SELECT sha256, file_path, size_bytes, source_url, metadata, date_added \
             FROM model_files WHERE file_path = ?1",
        )
        .bind(rel_path)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = canonical {
            return Ok(Some((row, true)));
        }

        let aliased = sqlx::query_as::<_, ModelFile>(
            "SELECT mf.sha256, mf.file_path, mf.size_bytes, mf.source_url, \
                    mf.metadata, mf.date_added \
             FROM model_aliases ma JOIN model_files mf ON ma.sha256 = mf.sha256 \
             WHERE ma.alias_path = ?1",
        )
        .bind(rel_path)
        .fetch_optional(&self.db)
        .await?;

        Ok(aliased.map(|row| (row, false)))
    }

    /// Register a model. Idempotent: returns false when the hash is
    /// already present. `source_url` must already be admission-sanitized.
    pub async fn insert_artifact(&self, new: &NewModelFile) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO model_files \
             (sha256, file_path, size_bytes, source_url, metadata, date_added) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&new.sha256)
        .bind(&new.file_path)
        .bind(new.size_bytes)
        .bind(&new.source_url)
        .bind(new.metadata.to_string())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::info!(
                sha256 = %short_hash(&new.sha256),
                path = %new.file_path,
                size = new.size_bytes,
                "Registered model"
            );
        } else {
            tracing::debug!(sha256 = %short_hash(&new.sha256), "Model already registered");
        }
        Ok(inserted)
    }

    /// Rebind the canonical path of an existing hash row. Used to self-heal
    /// when the recorded canonical file has gone missing and the bytes were
    /// re-fetched to a new destination.
    pub async fn rebind_canonical(&self, sha256: &str, rel_path: &str, size: i64) -> Result<()> {
        sqlx::query(
            "UPDATE model_files SET file_path = ?2, size_bytes = ?3, date_added = ?4 \
             WHERE sha256 = ?1",
        )
        .bind(sha256)
        .bind(rel_path)
        .bind(size)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        tracing::warn!(sha256 = %short_hash(sha256), path = %rel_path, "Rebound canonical path");
        Ok(())
    }

    /// Add an alias for an existing model. Idempotent on `(hash, path)`;
    /// returns false when the alias already exists or the hash is unknown.
    pub async fn insert_alias(&self, sha256: &str, alias_path: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT sha256 FROM model_files WHERE sha256 = ?1")
                .bind(sha256)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            tracing::warn!(sha256 = %short_hash(sha256), "Cannot create alias: hash not registered");
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO model_aliases (sha256, alias_path, created_at) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(sha256)
        .bind(alias_path)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::info!(sha256 = %short_hash(sha256), alias = %alias_path, "Created alias");
        }
        Ok(inserted)
    }

    /// List all registered models, most recent first.
    pub async fn list_artifacts(&self) -> Result<Vec<ModelFile>> {
        let rows = sqlx::query_as::<_, ModelFile>(
            "SELECT sha256, file_path, size_bytes, source_url, metadata, date_added \
             FROM model_files ORDER BY date_added DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// List aliases recorded for a hash.
    pub async fn list_aliases_for(&self, sha256: &str) -> Result<Vec<ModelAlias>> {
        let rows = sqlx::query_as::<_, ModelAlias>(
            "SELECT id, sha256, alias_path, created_at FROM model_aliases \
             WHERE sha256 = ?1 ORDER BY id",
        )
        .bind(sha256)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Remove a model and its aliases from the registry. Does not touch the
    /// filesystem. Returns false when the hash was not registered.
    pub async fn remove(&self, sha256: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM model_aliases WHERE sha256 = ?1")
            .bind(sha256)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM model_files WHERE sha256 = ?1")
            .bind(sha256)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop alias rows whose filesystem entry has disappeared. The
    /// filesystem is the source of truth for readers; rows left behind by
    /// operator deletions are garbage collected here.
    pub async fn prune_dangling_aliases(&self, base: &Path) -> Result<u64> {
        let aliases = sqlx::query_as::<_, ModelAlias>(
            "SELECT id, sha256, alias_path, created_at FROM model_aliases",
        )
        .fetch_all(&self.db)
        .await?;

        let mut pruned = 0u64;
        for alias in aliases {
            let abs = base.join(&alias.alias_path);
            if tokio::fs::symlink_metadata(&abs).await.is_err() {
                sqlx::query("DELETE FROM model_aliases WHERE id = ?1")
                    .bind(alias.id)
                    .execute(&self.db)
                    .await?;
                tracing::debug!(alias = %alias.alias_path, "Pruned dangling alias row");
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Aggregate registry statistics.
    pub async fn stats(&self) -> Result<RegistryStats> {
        let (artifact_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_files")
            .fetch_one(&self.db)
            .await?;
        let (alias_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_aliases")
            .fetch_one(&self.db)
            .await?;
        let (total_size_bytes,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(size_bytes) FROM model_files")
                .fetch_one(&self.db)
                .await?;

        Ok(RegistryStats {
            artifact_count,
            alias_count,
            total_size_bytes: total_size_bytes.unwrap_or(0),
        })
    }
}

/// Abbreviated hash for log lines.
pub fn short_hash(sha256: &str) -> &str {
    &sha256[..sha256.len().min(16)]
}

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute the SHA-256 hex digest of a file by streaming reads.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
