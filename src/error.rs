use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::store::StoreError;

/// Top-level error surfaced by the core's façade methods.
///
/// Library modules raise their own narrow error types
/// ([`RuntimeError`], [`StoreError`]); this enum is what the admin façade
/// and the CLI see.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DaemonError::Runtime(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            DaemonError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            DaemonError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DaemonError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DaemonError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
