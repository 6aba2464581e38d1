// src/error.rs
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Caller mistake; never contacts upstream and never logged as a fault.
    #[error("{0}")]
    BadRequest(String),

    /// Anything that went wrong talking to Gemini: timeout, network failure,
    /// non-2xx status. The upstream detail is returned to the caller for
    /// debuggability, not as a hardened boundary.
    #[error("error calling Gemini")]
    Upstream { detail: Value },
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream {
            detail: Value::String(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            AppError::Upstream { detail } => {
                tracing::error!(%detail, "upstream call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "error calling Gemini", "detail": detail })),
                )
                    .into_response()
            }
        }
    }
}
