//! Route handlers. Each one builds a [`RequestContext`](crate::gateway::RequestContext), hands it to the
//! dispatcher and translates the result.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::downstream::Service;
use crate::gateway::{GateError, Payload, RouteClass};
use crate::http::request::{raw_path_param, request_id};
use crate::http::response::with_rate_headers;
use crate::http::server::AppState;

pub async fn health(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let ctx = state.dispatcher.admit(state.context(&headers, addr, RouteClass::Health)).await?;
    let body = Json(json!({
        "status": "ok",
        "service": "sec-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }));
    Ok(with_rate_headers(body.into_response(), &ctx))
}

pub async fn run_tool(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(tool): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    let payload = Payload::Tool {
        tool: tool.parse().ok(),
        body,
    };
    let ctx = state.context(&headers, addr, RouteClass::Tool).with_payload(payload);
    let (ctx, output) = state.dispatcher.dispatch_tool(ctx).await?;
    Ok(with_rate_headers(Json(output).into_response(), &ctx))
}

pub async fn read_file(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let payload = Payload::File(raw_path_param(query.as_deref()));
    let ctx = state.context(&headers, addr, RouteClass::File).with_payload(payload);
    let (ctx, content) = state.dispatcher.dispatch_file(ctx).await?;

    let mut response = content.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(with_rate_headers(response, &ctx))
}

pub async fn quantum(
    state: State<AppState>,
    addr: ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    forward(state, addr, Service::Quantum, method, uri, headers, body).await
}

pub async fn ai(
    state: State<AppState>,
    addr: ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    forward(state, addr, Service::Ai, method, uri, headers, body).await
}

async fn forward(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    service: Service,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    // The path is taken still encoded so the tail grammar sees escapes.
    let prefix = format!("/api/{}/", service.as_str());
    let tail = uri.path().strip_prefix(&prefix).unwrap_or_default().to_string();

    let payload = Payload::Downstream { method, tail, body };
    let ctx = state.context(&headers, addr, RouteClass::Downstream(service)).with_payload(payload);
    let (ctx, downstream) = state.dispatcher.dispatch_downstream(ctx).await?;

    let mut response = (downstream.status, downstream.body).into_response();
    if let Some(value) = downstream
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(with_rate_headers(response, &ctx))
}

pub async fn not_found(headers: HeaderMap) -> Response {
    tracing::debug!(request_id = %request_id(&headers), "No route matched");
    GateError::NotFound.into_response()
}
