//! Error shapes the HTTP layer actually returns. Per §4.M/N the Control
//! API never lets a Rust `Result::Err` cross a handler boundary — every
//! handler below catches and maps to one of these before responding, or
//! to the endpoint's own bespoke JSON shape (`{completed,succeeded,...}`,
//! `{pin,taskid,msg}`, etc.) on the success path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub enum ApiError {
    InvalidUuid,
    NotFound(&'static str),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidUuid => (StatusCode::BAD_REQUEST, "invalid uuid".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<hostlink_core::CoreError> for ApiError {
    fn from(err: hostlink_core::CoreError) -> Self {
        tracing::error!(error = %err, "settings store I/O failed");
        ApiError::Internal("internal error".to_string())
    }
}

pub fn valid_uuid(candidate: &str) -> bool {
    uuid::Uuid::parse_str(candidate).is_ok()
}
