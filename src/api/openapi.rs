//! OpenAPI document assembly.

use utoipa::OpenApi;

use crate::api::dto;
use crate::models;
use crate::services::migration_service::MigrationSummary;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Model Registry API",
        description = "Content-addressed model registry and streaming download service"
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::models::check_dependencies,
        crate::api::handlers::models::download_model,
        crate::api::handlers::models::list_registry,
        crate::api::handlers::models::registry_stats,
        crate::api::handlers::models::run_migration,
    ),
    components(schemas(
        dto::CheckDependenciesRequest,
        dto::DownloadModelRequest,
        dto::MigrateRequest,
        dto::RegistryModelResponse,
        dto::RegistryStatsResponse,
        models::dependency::DependencyAction,
        models::dependency::DependencyEntry,
        models::dependency::DependencyResolution,
        models::dependency::ExistingDependency,
        models::dependency::MissingDependency,
        MigrationSummary,
    )),
    tags(
        (name = "models", description = "Model registry and downloads"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI document.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
