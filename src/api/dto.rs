//! Request/response DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::DependencyManifest;

/// `POST /models/download` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DownloadModelRequest {
    pub url: String,
    /// Model kind; selects the destination directory
    pub folder: String,
    /// Destination filename; derived from the URL when absent
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Ephemeral HuggingFace token; never logged or persisted
    #[serde(default)]
    pub huggingface_token: Option<String>,
    /// Ephemeral CivitAI API key; never logged or persisted
    #[serde(default)]
    pub civitai_api_key: Option<String>,
}

/// `POST /models/check-dependencies` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckDependenciesRequest {
    pub dependencies: DependencyManifest,
}

/// `POST /models/migrate` request body.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MigrateRequest {
    /// Restrict the pass to one kind; all kinds when absent
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// One registered model in `GET /models/registry`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistryModelResponse {
    pub sha256: String,
    pub file_path: String,
    pub size_bytes: i64,
    pub source_url: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub date_added: DateTime<Utc>,
    pub aliases: Vec<String>,
}

/// `GET /models/registry/stats` response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistryStatsResponse {
    pub artifact_count: i64,
    pub alias_count: i64,
    pub total_size_bytes: i64,
}
