//! Request size limits.
//!
//! Bodies over the limit are refused with 413 before they are buffered.

use tower_http::limit::RequestBodyLimitLayer;

use crate::config::schema::LimitsConfig;

pub fn body_limit(config: &LimitsConfig) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(config.max_body_bytes)
}
