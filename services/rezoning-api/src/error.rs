//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use rezoning_common::LcoeError;
use tile_renderer::RenderError;

/// Error body: `{ "error": kind, "message": text }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Engine(LcoeError),
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => e.error_kind(),
            ApiError::NotFound(_) => "not_found",
        }
    }
}

impl From<LcoeError> for ApiError {
    fn from(e: LcoeError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::InvalidColor(_) => {
                ApiError::Engine(LcoeError::invalid_parameter("color", e.to_string()))
            }
            other => ApiError::Engine(LcoeError::Internal(other.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::NotFound(path) => format!("no route for {}", path),
        };
        if status.is_server_error() {
            error!(kind = self.kind(), %message, "Request failed");
        } else {
            warn!(kind = self.kind(), %message, "Request rejected");
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
