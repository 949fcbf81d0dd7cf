//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{Error, TranslationError};

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Domain(err) => match err {
                Error::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                Error::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} {id} not found"),
                ),
                Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                Error::Upstream(TranslationError::NotConfigured) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TRANSLATION_UNAVAILABLE",
                    "translation is not configured".to_string(),
                ),
                Error::Upstream(upstream) => {
                    tracing::warn!(error = %upstream, "Translation provider failed");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", upstream.to_string())
                }
                Error::Storage(_) | Error::Config(_) => {
                    tracing::error!(error = %err, "Internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(
            status_of(Error::Validation("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::tour_not_found("abc").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::Conflict("dup".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                Error::Upstream(TranslationError::InvalidResponse("bad".into())).into()
            ),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(Error::Upstream(TranslationError::Prompt("bad".into())).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(Error::Storage(DatabaseError::Query("boom".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::Unauthorized("no".into())),
            StatusCode::UNAUTHORIZED
        );
    }
}
