use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::credentials::is_key_id;
use crate::auth::{ApiKey, CredentialStore, Role};
use crate::gateway::{GateError, RequestContext, RouteClass};
use crate::http::response::with_rate_headers;
use crate::http::server::AppState;
use crate::security::sanitizer::{RejectReason, RejectedInput};

const MAX_LABEL_LEN: usize = 64;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub auth_enabled: bool,
    pub keys: KeyCounts,
    pub rate_windows: usize,
    pub tool_slots_available: usize,
}

#[derive(Serialize)]
pub struct KeyCounts {
    pub active: usize,
    pub revoked: usize,
}

/// Key metadata as shown to admins. The stored hash is never exposed.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyView {
    pub id: String,
    pub role: Role,
    pub created_at: u64,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
}

impl From<ApiKey> for KeyView {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            role: key.role,
            created_at: key.created_at,
            revoked: key.revoked,
            label: key.label,
            rate_limit_per_minute: key.rate_limit_per_minute,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateKeyRequest {
    pub role: Role,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

#[derive(Serialize)]
pub struct CreatedKey {
    /// Shown once; only the hash is kept.
    pub token: String,
    pub key: KeyView,
}

async fn admit(state: &AppState, headers: &HeaderMap, addr: SocketAddr) -> Result<RequestContext, GateError> {
    state.dispatcher.admit(state.context(headers, addr, RouteClass::Admin)).await
}

pub async fn get_status(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let ctx = admit(&state, &headers, addr).await?;
    let (active, revoked) = state.dispatcher.store().summary();

    let status = SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        auth_enabled: state.config.auth.enabled,
        keys: KeyCounts { active, revoked },
        rate_windows: state.dispatcher.limiter().tracked(),
        tool_slots_available: state.dispatcher.runner().available(),
    };
    Ok(with_rate_headers(Json(status).into_response(), &ctx))
}

pub async fn list_keys(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let ctx = admit(&state, &headers, addr).await?;
    let keys: Vec<KeyView> = state.dispatcher.store().list().into_iter().map(KeyView::from).collect();
    Ok(with_rate_headers(Json(keys).into_response(), &ctx))
}

pub async fn create_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    let ctx = admit(&state, &headers, addr).await?;

    let request: CreateKeyRequest = serde_json::from_slice(&body).map_err(|_| GateError::MalformedBody)?;
    if let Some(label) = &request.label {
        if label.is_empty() || label.len() > MAX_LABEL_LEN || label.chars().any(char::is_control) {
            return Err(RejectedInput::new("label", RejectReason::UnsupportedValue).into());
        }
    }
    if request.rate_limit_per_minute == Some(0) {
        return Err(RejectedInput::new("rate_limit_per_minute", RejectReason::UnsupportedValue).into());
    }

    let store = state.dispatcher.store();
    let issued = store.issue(request.role, request.label, request.rate_limit_per_minute);
    tracing::info!(
        target: "audit",
        admin = ctx.principal.as_ref().and_then(|p| p.key_id()).unwrap_or("-"),
        key_id = %issued.key.id,
        "Key created through admin API"
    );
    persist(store).await;

    let created = CreatedKey {
        token: issued.token,
        key: issued.key.into(),
    };
    Ok(with_rate_headers((StatusCode::CREATED, Json(created)).into_response(), &ctx))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let ctx = admit(&state, &headers, addr).await?;
    if !is_key_id(&id) {
        return Err(GateError::NotFound);
    }

    let store = state.dispatcher.store();
    let key = store.revoke(&id).ok_or(GateError::NotFound)?;
    persist(store).await;

    Ok(with_rate_headers(Json(KeyView::from(key)).into_response(), &ctx))
}

/// Write the keys file off the async runtime.
async fn persist(store: &CredentialStore) {
    if store.persistence_path().is_none() {
        return;
    }
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.save_to_file()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to persist keys file"),
        Err(e) => tracing::error!(error = %e, "Keys persistence task failed"),
    }
}
