use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::newapi::GatewayError;
use crate::store::StoreError;

/// Errors surfaced by dashboard routes. The body is always
/// `{"error": "<message>"}`, which is what the dashboard pages read.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A gateway call failed. `context` is what the user sees.
    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn upstream(context: &'static str, source: GatewayError) -> Self {
        AppError::Upstream { context, source }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream { context, source } => {
                tracing::error!(error = %source, "{}", context);
                (StatusCode::BAD_GATEWAY, context.to_string())
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}
