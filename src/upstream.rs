//! Credentialed GET requests against the upstream game-statistics API.

use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/// Status and raw body of an upstream reply, relayed as-is to the caller.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    bearer: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProxyError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer: format!("Bearer {}", config.api_key),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn player_url(&self, encoded_tag: &str) -> String {
        format!("{}/players/{}", self.base_url, encoded_tag)
    }

    pub fn battlelog_url(&self, encoded_tag: &str) -> String {
        format!("{}/players/{}/battlelog", self.base_url, encoded_tag)
    }

    /// GET `url` with the server-held credential.
    ///
    /// Any status the upstream answers with is returned as `Ok`; only
    /// transport and body-read failures are errors.
    pub async fn fetch(&self, url: &str) -> Result<UpstreamResponse> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, &self.bearer)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        // The client timeout also covers the body; a stall mid-body is still an
        // upstream failure, not a local one.
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamUnavailable(format!("{}: {}", url, e))
            } else {
                ProxyError::InternalFailure(format!("Error reading response body from {}: {}", url, e))
            }
        })?;

        tracing::debug!(url, status = %status, bytes = body.len(), "Upstream responded");

        Ok(UpstreamResponse { status, body })
    }
}
