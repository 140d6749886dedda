use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::ProxyError;
use crate::rate_limiter::RateLimiter;
use crate::response::HealthResponse;
use crate::upstream::{UpstreamClient, UpstreamResponse};
use crate::validation::encode_tag;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state containing the rate limiter and upstream client
pub struct AppState {
    pub limiter: RateLimiter,
    pub upstream: UpstreamClient,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::ok())
}

/// Proxy `GET /api/player/{tag}` to `players/{tag}`
pub async fn player(
    State(state): State<SharedState>,
    tag: Option<Path<String>>,
) -> Result<Response, ProxyError> {
    let encoded = required_tag(tag)?;
    let url = state.upstream.player_url(&encoded);
    relay(&state.upstream, &url).await
}

/// Proxy `GET /api/battlelog/{tag}` to `players/{tag}/battlelog`
pub async fn battlelog(
    State(state): State<SharedState>,
    tag: Option<Path<String>>,
) -> Result<Response, ProxyError> {
    let encoded = required_tag(tag)?;
    let url = state.upstream.battlelog_url(&encoded);
    relay(&state.upstream, &url).await
}

/// CORS preflight; the CORS headers themselves are added by the router.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

fn required_tag(tag: Option<Path<String>>) -> Result<String, ProxyError> {
    let Path(tag) = tag.unwrap_or_else(|| Path(String::new()));
    encode_tag(&tag).inspect_err(|e| tracing::debug!(tag = %tag, error = %e, "Rejected player tag"))
}

async fn relay(upstream: &UpstreamClient, url: &str) -> Result<Response, ProxyError> {
    let UpstreamResponse { status, body } = upstream.fetch(url).await?;

    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    Ok(response)
}
