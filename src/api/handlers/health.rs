//! Health endpoints.

use axum::{extract::State, Json};
use serde_json::json;

use crate::api::SharedState;
use crate::error::Result;

/// Liveness/readiness check. Verifies the catalog answers a trivial query.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service healthy"))
)]
pub async fn health_check(State(state): State<SharedState>) -> Result<Json<serde_json::Value>> {
    sqlx::query("SELECT 1").execute(&state.db).await?;
    Ok(Json(json!({ "status": "ok" })))
}
