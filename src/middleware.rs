use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::handlers::SharedState;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Logging middleware for request/response tracking
pub async fn logging_middleware(
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_identity(request.headers(), peer_addr(&request));

    let span = info_span!("request", %request_id);

    async move {
        info!(
            target: "brawl_proxy::middleware",
            method = %method,
            uri = %uri,
            client_ip = %client_ip,
            "Incoming request"
        );

        let response = next.run(request).await;

        info!(
            target: "brawl_proxy::middleware",
            method = %method,
            uri = %uri,
            status = %response.status(),
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}

/// Admit or reject a request based on its client identity.
///
/// Preflight `OPTIONS` requests pass through without spending a token.
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let identity = client_identity(request.headers(), peer_addr(&request));

    let decision = match state.limiter.check(&identity) {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(
            client_ip = %identity,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        ProxyError::RateLimitExceeded {
            retry_after_secs: state.limiter.config().retry_after_secs(),
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));

    response
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Rate limit key for a request: the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the peer IP without its port.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first_ip) = forwarded.split(',').next() {
            return first_ip.trim().to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return real_ip.to_string();
    }

    // Fallback to connection info
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}
