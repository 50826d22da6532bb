//! Mapping of errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::RatewardenError;

/// Errors returned by the admin handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is missing fields or is not valid JSON
    #[error("{0}")]
    BadRequest(String),

    /// The limiter refused or failed the operation
    #[error(transparent)]
    Limiter(#[from] RatewardenError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Limiter(RatewardenError::InvalidConfig(message)) => {
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Limiter(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Response for request bodies larger than the configured limit.
pub(crate) fn payload_too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ErrorBody {
            error: "Payload Too Large".to_string(),
        }),
    )
        .into_response()
}
