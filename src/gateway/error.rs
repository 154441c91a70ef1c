//! The single failure type of the gate chain and its HTTP mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::downstream::UpstreamError;
use crate::security::path_resolver::PathError;
use crate::security::rate_limit::RateLimitError;
use crate::security::sanitizer::RejectedInput;
use crate::tools::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error(transparent)]
    Rejected(#[from] RejectedInput),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("malformed request body")]
    MalformedBody,
    #[error("unknown tool")]
    UnknownTool,
    #[error("resource not found")]
    NotFound,
    #[error("gate `{0}` did not finish in time")]
    GateTimeout(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Auth(_) => StatusCode::UNAUTHORIZED,
            GateError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GateError::Rejected(_) | GateError::MalformedBody => StatusCode::BAD_REQUEST,
            GateError::Path(PathError::Traversal | PathError::Malformed) => StatusCode::BAD_REQUEST,
            GateError::Path(PathError::NotFound) => StatusCode::NOT_FOUND,
            GateError::Path(PathError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::Path(PathError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::Tool(ToolError::Disabled(_)) | GateError::UnknownTool | GateError::NotFound => {
                StatusCode::NOT_FOUND
            }
            GateError::Tool(ToolError::Busy) => StatusCode::SERVICE_UNAVAILABLE,
            GateError::Tool(ToolError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GateError::Tool(ToolError::Spawn { .. } | ToolError::Io(_)) => StatusCode::BAD_GATEWAY,
            GateError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GateError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GateError::GateTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Auth(_) => "unauthorized",
            GateError::RateLimited(_) => "rate_limited",
            GateError::Rejected(_) | GateError::MalformedBody => "invalid_input",
            GateError::Path(PathError::Traversal | PathError::Malformed) => "invalid_path",
            GateError::Path(PathError::NotFound) | GateError::NotFound => "not_found",
            GateError::Path(PathError::TooLarge) => "file_too_large",
            GateError::Tool(ToolError::Disabled(_)) | GateError::UnknownTool => "unknown_tool",
            GateError::Tool(ToolError::Busy) => "tool_busy",
            GateError::Tool(ToolError::Timeout(_)) => "tool_timeout",
            GateError::Tool(_) => "tool_failed",
            GateError::Upstream(UpstreamError::Timeout) => "upstream_timeout",
            GateError::Upstream(_) => "upstream_failed",
            GateError::GateTimeout(_) => "gateway_timeout",
            GateError::Path(PathError::Io(_)) | GateError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing text. Never includes raw input or downstream detail.
    pub fn message(&self) -> String {
        match self {
            GateError::Auth(_) => "a valid API key is required".to_string(),
            GateError::RateLimited(RateLimitError::Exceeded { retry_after_secs, .. }) => {
                format!("rate limit exceeded, retry after {} seconds", retry_after_secs)
            }
            GateError::Rejected(rejected) => format!("invalid value for field `{}`", rejected.field),
            GateError::MalformedBody => "malformed request body".to_string(),
            GateError::Path(PathError::Traversal | PathError::Malformed) => "invalid file path".to_string(),
            GateError::Path(PathError::NotFound) | GateError::NotFound => "resource not found".to_string(),
            GateError::Path(PathError::TooLarge) => "file exceeds the size limit".to_string(),
            GateError::Tool(ToolError::Disabled(_)) | GateError::UnknownTool => "unknown tool".to_string(),
            GateError::Tool(ToolError::Busy) => "all tool slots are busy, try again later".to_string(),
            GateError::Tool(ToolError::Timeout(_)) => "tool did not finish in time".to_string(),
            GateError::Tool(_) => "tool invocation failed".to_string(),
            GateError::Upstream(UpstreamError::Timeout) => "upstream service timed out".to_string(),
            GateError::Upstream(_) => "upstream service failed".to_string(),
            GateError::GateTimeout(_) => "request could not be evaluated in time".to_string(),
            GateError::Path(PathError::Io(_)) | GateError::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));
        let mut response = (status, body).into_response();

        if let GateError::RateLimited(RateLimitError::Exceeded { retry_after_secs, limit }) = self {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
        }
        response
    }
}
