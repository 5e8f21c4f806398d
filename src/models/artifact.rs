//! Catalog row models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A registered model file. One row per unique SHA-256; the hash is the
/// sole identity, `file_path` is where the bytes physically reside
/// (relative to the model base directory).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModelFile {
    pub sha256: String,
    pub file_path: String,
    pub size_bytes: i64,
    pub source_url: Option<String>,
    /// Opaque JSON blob (display name, originating kind, ...)
    pub metadata: Option<String>,
    pub date_added: DateTime<Utc>,
}

impl ModelFile {
    /// Parse the metadata blob, returning an empty object when absent or invalid.
    pub fn metadata_value(&self) -> serde_json::Value {
        self.metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

/// A secondary filename under which a registered model is reachable.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModelAlias {
    pub id: i64,
    pub sha256: String,
    pub alias_path: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new model file row.
#[derive(Debug, Clone)]
pub struct NewModelFile {
    pub sha256: String,
    pub file_path: String,
    pub size_bytes: i64,
    pub source_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Aggregate catalog statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub artifact_count: i64,
    pub alias_count: i64,
    pub total_size_bytes: i64,
}
