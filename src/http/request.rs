//! Request identification and extraction helpers.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `X-Request-Id` is kept, otherwise a UUID v4 is minted
//! - Query values are handed on still encoded; the path gate decodes them

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// The request ID assigned by [`set_request_id_layer`].
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The presented API key, if the header is present and valid text.
pub fn presented_key(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Value of the single `path` query parameter, still percent-encoded.
/// A form-encoded `+` becomes `%20`; a literal plus arrives as `%2B`.
/// Missing or repeated parameters yield `None`.
pub fn raw_path_param(query: Option<&str>) -> Option<String> {
    let mut values = query?
        .split('&')
        .filter_map(|pair| pair.strip_prefix("path="));
    let first = values.next()?;
    match values.next() {
        Some(_) => None,
        None => Some(first.replace('+', "%20")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_raw_path_param() {
        assert_eq!(raw_path_param(Some("path=reports%2Fscan.txt")), Some("reports%2Fscan.txt".into()));
        assert_eq!(raw_path_param(Some("x=1&path=a.txt")), Some("a.txt".into()));
        assert_eq!(raw_path_param(Some("path=a.txt&path=../b")), None);
        assert_eq!(raw_path_param(Some("filepath=a.txt")), None);
        assert_eq!(raw_path_param(None), None);
        assert_eq!(raw_path_param(Some("path=my+report.txt")), Some("my%20report.txt".into()));
        assert_eq!(raw_path_param(Some("path=c%2B%2B.txt")), Some("c%2B%2B.txt".into()));
    }

    #[test]
    fn test_presented_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers, "X-API-Key"), None);
        headers.insert("x-api-key", HeaderValue::from_static("sgw_abc.def"));
        assert_eq!(presented_key(&headers, "X-API-Key").as_deref(), Some("sgw_abc.def"));
    }
}
