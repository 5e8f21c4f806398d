//! Route definitions for the API.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    let router = Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        // OpenAPI spec and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi))
        // Model registry routes
        .nest(
            "/models",
            handlers::models::router().layer(DefaultBodyLimit::max(1024 * 1024)), // 1 MB
        );

    router.with_state(state)
}
