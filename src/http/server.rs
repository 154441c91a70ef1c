//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, limits, timeouts, security headers)
//! - Bind server to a plain or TLS listener
//! - Run background maintenance (rate window sweeper) until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::routing::{any, get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::auth::CredentialStore;
use crate::config::GatewayConfig;
use crate::gateway::{Dispatcher, GateError, RequestContext, RouteClass};
use crate::http::handlers;
use crate::http::request::{presented_key, propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::track_metrics;
use crate::lifecycle::Shutdown;
use crate::security::headers::with_security_headers;
use crate::security::limits::body_limit;

/// Grace period for in-flight TLS connections on shutdown.
const TLS_DRAIN_SECS: u64 = 10;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Start a gate context for this request.
    pub fn context(&self, headers: &HeaderMap, addr: SocketAddr, route: RouteClass) -> RequestContext {
        RequestContext::new(
            request_id(headers),
            addr.ip(),
            route,
            presented_key(headers, &self.config.auth.header_name),
        )
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, store: CredentialStore) -> Result<Self, GateError> {
        let dispatcher = Arc::new(Dispatcher::new(&config, store)?);
        let state = AppState {
            dispatcher,
            config: Arc::new(config),
        };
        let router = Self::build_app(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_app(state: AppState) -> Router {
        let config = state.config.clone();

        let routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/tools/{tool}", post(handlers::run_tool))
            .route("/api/files", get(handlers::read_file))
            .route("/api/quantum/{*path}", any(handlers::quantum))
            .route("/api/ai/{*path}", any(handlers::ai))
            .merge(admin::router())
            .route_layer(middleware::from_fn(track_metrics))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(body_limit(&config.limits))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer());

        with_security_headers(routes)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn spawn_background(&self, shutdown: &Shutdown) {
        let limiter = self.state.dispatcher.limiter().clone();
        let interval = Duration::from_secs(self.state.config.rate_limit.sweep_interval_secs);
        tokio::spawn(limiter.run_sweeper(interval, shutdown.subscribe()));
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_background(shutdown);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server behind rustls on `addr`.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_background(shutdown);

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            tracing::info!("HTTPS server draining connections");
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
