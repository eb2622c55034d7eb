//! HTTP error mapping.
//!
//! Every handler returns `Result<_, ApiError>`; bodies share the shape
//! `{"error": ..., "detail": ..., "type": ...}`.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::MnemoError;

#[derive(Debug)]
pub enum ApiError {
    /// 400: request failed semantic validation.
    Validation(String),
    /// 422: body could not be parsed into the expected shape.
    Unprocessable(String),
    /// 413: body exceeded the size cap.
    PayloadTooLarge,
    /// 401: credentials or token rejected.
    Unauthorized(String),
    /// 403: no bearer credentials supplied.
    NotAuthenticated,
    /// 429: per-client limit exhausted.
    RateLimited { detail: String, retry_after: u64 },
    /// 500: `kind` and detail are logged, never returned.
    Internal { kind: &'static str, detail: String },
}

impl ApiError {
    /// 500 for a failure outside the crate error type.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            kind: "internal_error",
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotAuthenticated => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MnemoError> for ApiError {
    fn from(err: MnemoError) -> Self {
        match err {
            MnemoError::Validation(msg) => Self::Validation(msg),
            MnemoError::Unauthorized(msg) => Self::Unauthorized(msg),
            other => Self::Internal {
                kind: other.kind(),
                detail: other.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::Unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(detail) => (
                status,
                Json(json!({
                    "error": "Invalid input",
                    "detail": detail,
                    "type": "validation_error",
                })),
            )
                .into_response(),
            Self::Unprocessable(detail) => (
                status,
                Json(json!({
                    "error": "Validation error",
                    "detail": detail,
                    "type": "validation_error",
                })),
            )
                .into_response(),
            Self::PayloadTooLarge => (
                status,
                Json(json!({
                    "error": "Payload too large",
                    "detail": "Request body exceeds the size limit",
                    "type": "validation_error",
                })),
            )
                .into_response(),
            Self::Unauthorized(detail) => {
                warn!(detail = %detail, "Authentication rejected");
                let mut response = (
                    status,
                    Json(json!({
                        "error": detail,
                        "detail": detail,
                        "type": "authentication_error",
                    })),
                )
                    .into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
                response
            }
            Self::NotAuthenticated => (
                status,
                Json(json!({
                    "error": "Not authenticated",
                    "detail": "Not authenticated",
                    "type": "authentication_error",
                })),
            )
                .into_response(),
            Self::RateLimited {
                detail,
                retry_after,
            } => {
                let mut response = (
                    status,
                    Json(json!({
                        "error": "Rate limit exceeded",
                        "detail": detail,
                        "retry_after": retry_after,
                        "type": "rate_limit_error",
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            Self::Internal { kind, detail } => {
                error!(kind, detail = %detail, "Request failed");
                (
                    status,
                    Json(json!({
                        "error": "Internal server error",
                        "detail": "An unexpected error occurred",
                        "type": "internal_error",
                    })),
                )
                    .into_response()
            }
        }
    }
}
