//! Admin API for key management.
//!
//! Every route requires an admin key and goes through the same gate chain
//! as the rest of the gateway, including rate limiting.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;

use crate::http::server::AppState;
use self::handlers::*;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/keys", get(list_keys).post(create_key))
        .route("/admin/keys/{id}/revoke", post(revoke_key))
}
