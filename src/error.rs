//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog backing store failure. Fatal for the enclosing request —
    /// callers must not proceed without the catalog.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Catalog unavailable: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Invalid model kind or filename (traversal, bad extension, ...)
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Download URL host not on the allowlist
    #[error("URL forbidden: {0}")]
    UrlForbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials for the upstream source
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Destination filename already occupied by unrelated content
    #[error("Alias collision: {0}")]
    AliasCollision(String),

    /// Upstream source returned a non-success status
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map error variant to HTTP status code and machine-readable error kind.
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ConfigError"),
            Self::CatalogUnavailable(_) | Self::Sqlx(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CatalogUnavailable")
            }
            Self::InvalidName(_) => (StatusCode::BAD_REQUEST, "InvalidName"),
            Self::UrlForbidden(_) => (StatusCode::BAD_REQUEST, "UrlForbidden"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            Self::AliasCollision(_) => (StatusCode::CONFLICT, "AliasCollision"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "UpstreamError"),
            Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IoError"),
            Self::AddrParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AddrParseError"),
            Self::Json(_) => (StatusCode::BAD_REQUEST, "JsonError"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }

    /// Return a user-facing message. Internal details are hidden for
    /// wrapped foreign errors (Sqlx, Io) to avoid leaking internals.
    fn user_message(&self) -> String {
        match self {
            Self::Sqlx(_) => "Catalog operation failed".to_string(),
            Self::Io(_) => "IO operation failed".to_string(),
            Self::AddrParse(_) => "Invalid address".to_string(),
            Self::Json(_) => "Invalid JSON".to_string(),
            // All other variants carry their own user-facing message
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = self.user_message();

        tracing::error!(error = %self, kind = kind, "Request error");

        let body = Json(json!({
            "error": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_url_maps_to_bad_request() {
        let (status, kind) = AppError::UrlForbidden("evil.example".into()).status_and_kind();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(kind, "UrlForbidden");
    }

    #[test]
    fn alias_collision_maps_to_conflict() {
        let (status, kind) = AppError::AliasCollision("x".into()).status_and_kind();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(kind, "AliasCollision");
    }

    #[test]
    fn catalog_errors_hide_internals() {
        let err = AppError::Sqlx(sqlx::Error::PoolClosed);
        assert_eq!(err.user_message(), "Catalog operation failed");
        let (status, _) = err.status_and_kind();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
