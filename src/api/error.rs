use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors returned by the native API endpoints.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown identity or wrong password
    AuthenticationFailed,
    /// Request body could not be read
    BadRequest(String),
    /// Store or token failure
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "Failed to authenticate."),
            Self::BadRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(_) => write!(f, "Something went wrong while processing your request."),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(msg) = &self {
            tracing::error!("Request failed: {}", msg);
        }

        let status = self.status();
        let body = json!({
            "code": status.as_u16(),
            "message": self.to_string(),
            "data": {},
        });
        (status, Json(body)).into_response()
    }
}
