use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::response::ErrorBody;

#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Missing or malformed input from the caller.
    #[error("{0}")]
    ClientError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Transport failure or timeout talking to the upstream API.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal failure: {0}")]
    InternalFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::ClientError(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InternalFailure(_) | ProxyError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for ProxyError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProxyError::Configuration(err.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ProxyError::ClientError(msg) => (status, msg).into_response(),
            ProxyError::RateLimitExceeded { retry_after_secs } => {
                let mut response = (status, Json(ErrorBody::rate_limited())).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            ProxyError::UpstreamUnavailable(detail) => {
                tracing::error!(error = %detail, "Error making request to upstream API");
                (status, "Failed to fetch data").into_response()
            }
            ProxyError::InternalFailure(detail) | ProxyError::Configuration(detail) => {
                tracing::error!(error = %detail, "Internal error while handling request");
                (status, "Internal server error").into_response()
            }
        }
    }
}
