//! Response decoration and request metrics.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::gateway::RequestContext;
use crate::observability::metrics;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Attach the rate-limit budget of an admitted request.
pub fn with_rate_headers(mut response: Response, ctx: &RequestContext) -> Response {
    if let Some(admission) = ctx.admission {
        let headers = response.headers_mut();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    }
    response
}

/// Count and time every routed request.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16(), start);
    response
}
