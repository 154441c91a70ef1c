//! Downstream services behind the gateway.
//!
//! # Data Flow
//! ```text
//! Admitted /api/quantum/* or /api/ai/* request
//!     → upstream.rs (forward to the configured AI/quantum service)
//!     → stubs.rs (local placeholder answers when no upstream is configured)
//! ```
//!
//! # Design Decisions
//! - Upstream 5xx bodies and transport errors are logged, never relayed
//! - TLS verification can only be disabled explicitly, with a warning

pub mod stubs;
pub mod upstream;

use axum::body::Bytes;
use axum::http::{Method, StatusCode};

pub use upstream::{UpstreamClient, UpstreamError};

/// The two forwarded route families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Quantum,
    Ai,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Quantum => "quantum",
            Service::Ai => "ai",
        }
    }
}

/// A validated forward, produced once the request has been admitted.
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub service: Service,
    pub method: Method,
    /// Validated route tail, without a leading slash.
    pub tail: String,
    pub body: Bytes,
}

/// What the downstream produced.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Upstream client when one is configured, local stubs otherwise.
pub enum Downstream {
    Upstream(UpstreamClient),
    Local,
}

impl Downstream {
    pub async fn call(&self, request: DownstreamRequest, request_id: &str) -> Result<DownstreamResponse, UpstreamError> {
        match self {
            Downstream::Upstream(client) => client.forward(request, request_id).await,
            Downstream::Local => Ok(stubs::handle(&request)),
        }
    }
}
