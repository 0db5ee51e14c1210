//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roster_sync_engine::Error as EngineError;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Engine(e) if e.is_not_found() => {
                (StatusCode::NOT_FOUND, e.to_string(), None)
            }
            AppError::Engine(
                e @ (EngineError::ConflictStillOpen(op_id) | EngineError::NotInFlight(op_id)),
            ) => {
                tracing::warn!(operation_id = %op_id, "Engine refused transition");
                (StatusCode::CONFLICT, e.to_string(), Some(op_id.clone()))
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn engine_errors_map_to_status() {
        assert_eq!(
            status_of(EngineError::OperationNotFound("op-1".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::ConflictNotFound("c-1".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::ConflictStillOpen("op-1".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::NotInFlight("op-2".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::InvalidStrategy("manual".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::InvalidConfig("maxAttempts".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn request_errors_map_to_status() {
        assert_eq!(
            status_of(AppError::BadRequest("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::NotFound("gone".into())),
            StatusCode::NOT_FOUND
        );
    }
}
