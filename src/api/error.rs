//! API error type and its HTTP mapping.

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::health::HealthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    /// A store the health check depends on failed.
    #[error("Upstream data error: {0:#}")]
    Upstream(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }
}

impl From<HealthError> for ApiError {
    fn from(err: HealthError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_code) = match &self {
            ApiError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = self.to_string();
        if status_code.is_server_error() {
            error!(code = error_code, "{}", message);
        }

        (
            status_code,
            Json(json!({
                "error": {
                    "code": error_code,
                    "message": message,
                }
            })),
        )
            .into_response()
    }
}
