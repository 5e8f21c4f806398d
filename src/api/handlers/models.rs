//! Model registry handlers: dependency check, streaming download,
//! registry listing, and the migration pass.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use uuid::Uuid;

use crate::api::dto::{
    CheckDependenciesRequest, DownloadModelRequest, MigrateRequest, RegistryModelResponse,
    RegistryStatsResponse,
};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::DependencyResolution;
use crate::services::credential_service::AuthProvider;
use crate::services::download_service::{DownloadRequest, ProgressEvent};
use crate::services::migration_service::MigrationSummary;

/// Create model registry routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/check-dependencies", post(check_dependencies))
        .route("/download", post(download_model))
        .route("/registry", get(list_registry))
        .route("/registry/stats", get(registry_stats))
        .route("/migrate", post(run_migration))
}

/// Classify a workflow's dependency manifest against the catalog.
#[utoipa::path(
    post,
    path = "/models/check-dependencies",
    tag = "models",
    request_body = CheckDependenciesRequest,
    responses(
        (status = 200, description = "Per-entry disposition", body = DependencyResolution),
        (status = 500, description = "Catalog unavailable")
    )
)]
pub async fn check_dependencies(
    State(state): State<SharedState>,
    Json(request): Json<CheckDependenciesRequest>,
) -> Result<Json<DependencyResolution>> {
    let resolution = state.resolver.resolve(&request.dependencies).await?;
    tracing::info!(
        missing = resolution.missing.len(),
        existing = resolution.existing.len(),
        download_bytes = resolution.total_download_size,
        saved_bytes = resolution.total_saved_size,
        "Checked workflow dependencies"
    );
    Ok(Json(resolution))
}

/// Download a model, streaming NDJSON progress frames.
///
/// Admission, path, and catalog failures surface as HTTP statuses with a
/// JSON error body; failures after the stream opens surface as in-stream
/// `{"error": ...}` frames.
#[utoipa::path(
    post,
    path = "/models/download",
    tag = "models",
    request_body = DownloadModelRequest,
    responses(
        (status = 200, description = "NDJSON progress stream", body = String, content_type = "application/x-ndjson"),
        (status = 400, description = "Invalid name or forbidden URL"),
        (status = 401, description = "Source requires credentials"),
        (status = 409, description = "Destination occupied by unrelated content")
    )
)]
pub async fn download_model(
    State(state): State<SharedState>,
    Json(request): Json<DownloadModelRequest>,
) -> Result<Response> {
    let mut tokens = Vec::new();
    if let Some(token) = request.huggingface_token {
        tokens.push((AuthProvider::Huggingface, token));
    }
    if let Some(key) = request.civitai_api_key {
        tokens.push((AuthProvider::Civitai, key));
    }

    let events = state
        .downloads
        .begin(DownloadRequest {
            request_id: Uuid::new_v4(),
            urls: vec![request.url],
            kind: request.folder,
            filename: request.filename,
            expected_sha256: request.sha256,
            expected_size: request.size,
            display_name: request.display_name,
            tokens,
        })
        .await?;

    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(ndjson_frame(&event))));

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}

/// List registered models with their aliases.
#[utoipa::path(
    get,
    path = "/models/registry",
    tag = "models",
    responses((status = 200, description = "Registered models", body = [RegistryModelResponse]))
)]
pub async fn list_registry(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RegistryModelResponse>>> {
    let artifacts = state.catalog.list_artifacts().await?;

    let mut models = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let aliases = state
            .catalog
            .list_aliases_for(&artifact.sha256)
            .await?
            .into_iter()
            .map(|a| a.alias_path)
            .collect();
        models.push(RegistryModelResponse {
            metadata: artifact.metadata_value(),
            sha256: artifact.sha256,
            file_path: artifact.file_path,
            size_bytes: artifact.size_bytes,
            source_url: artifact.source_url,
            date_added: artifact.date_added,
            aliases,
        });
    }

    Ok(Json(models))
}

/// Aggregate registry statistics.
#[utoipa::path(
    get,
    path = "/models/registry/stats",
    tag = "models",
    responses((status = 200, description = "Registry statistics", body = RegistryStatsResponse))
)]
pub async fn registry_stats(
    State(state): State<SharedState>,
) -> Result<Json<RegistryStatsResponse>> {
    let stats = state.catalog.stats().await?;
    Ok(Json(RegistryStatsResponse {
        artifact_count: stats.artifact_count,
        alias_count: stats.alias_count,
        total_size_bytes: stats.total_size_bytes,
    }))
}

/// Run the migration pass over the existing model tree.
#[utoipa::path(
    post,
    path = "/models/migrate",
    tag = "models",
    request_body = MigrateRequest,
    responses((status = 200, description = "Migration summary", body = MigrationSummary))
)]
pub async fn run_migration(
    State(state): State<SharedState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<MigrationSummary>> {
    let summary = state
        .migration
        .run(request.folder.as_deref(), request.dry_run)
        .await?;
    Ok(Json(summary))
}

/// Serialize one progress event as an NDJSON frame.
fn ndjson_frame(event: &ProgressEvent) -> Bytes {
    let mut line = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"error":"Failed to serialize progress event"}"#.to_string()
    });
    line.push('\n');
    Bytes::from(line)
}
