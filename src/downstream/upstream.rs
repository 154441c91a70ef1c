//! Forwarding to the configured AI/quantum service.

use std::time::Duration;

use axum::http::{header, StatusCode};
use url::Url;

use crate::config::UpstreamConfig;
use crate::downstream::{DownstreamRequest, DownstreamResponse};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream configuration: {0}")]
    Config(String),
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {0}")]
    Status(u16),
}

/// HTTP client bound to one upstream base URL.
pub struct UpstreamClient {
    client: reqwest::Client,
    base: Url,
}

impl UpstreamClient {
    pub fn new(base_url: &str, config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base = Url::parse(base_url).map_err(|e| UpstreamError::Config(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(UpstreamError::Config(format!("unsupported scheme `{}`", base.scheme())));
        }

        if !config.verify_tls {
            tracing::warn!(
                upstream = %base,
                "TLS certificate verification is DISABLED for upstream requests"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| UpstreamError::Config(e.to_string()))?;

        Ok(Self { client, base })
    }

    fn target(&self, request: &DownstreamRequest) -> String {
        format!(
            "{}/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            request.service.as_str(),
            request.tail
        )
    }

    /// Forward an admitted request. 5xx answers become [`UpstreamError::Status`]
    /// and their bodies are dropped.
    pub async fn forward(&self, request: DownstreamRequest, request_id: &str) -> Result<DownstreamResponse, UpstreamError> {
        let url = self.target(&request);
        tracing::debug!(request_id, service = request.service.as_str(), url = %url, "Forwarding upstream");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("x-request-id", request_id);
        if !request.body.is_empty() {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(request.body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

        if status.is_server_error() {
            tracing::warn!(request_id, status = status.as_u16(), url = %url, "Upstream server error");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(classify)?;

        Ok(DownstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::Service;
    use axum::body::Bytes;
    use axum::http::Method;

    #[test]
    fn test_rejects_bad_base() {
        let config = UpstreamConfig::default();
        assert!(matches!(
            UpstreamClient::new("ftp://quantum.internal", &config),
            Err(UpstreamError::Config(_))
        ));
        assert!(UpstreamClient::new("not a url", &config).is_err());
    }

    #[test]
    fn test_target_url() {
        let client = UpstreamClient::new("http://quantum.internal:8000/", &UpstreamConfig::default()).unwrap();
        let request = DownstreamRequest {
            service: Service::Quantum,
            method: Method::GET,
            tail: "random/256".to_string(),
            body: Bytes::new(),
        };
        assert_eq!(client.target(&request), "http://quantum.internal:8000/quantum/random/256");
    }
}
