use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use engine::EngineError;
use serde_json::json;
use tracing::error;

/// Wraps [`EngineError`] so it can be returned directly from an axum
/// handler. Invariant violations surface as 4xx; the ambient database
/// failure mode surfaces as 503, since the caller can usually retry.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError(EngineError::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            EngineError::Market(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            EngineError::OrderExpired(id) => (
                StatusCode::GONE,
                format!("order {id} has expired"),
            ),
            EngineError::InsufficientFunds { needed, have } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("insufficient funds: needed {needed}, have {have}"),
            ),
            EngineError::InvalidLifecycle(msg) => (StatusCode::CONFLICT, msg.clone()),
            EngineError::Database(err) => {
                error!(%err, "database error serving request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "a database error occurred".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
