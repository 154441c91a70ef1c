//! Runs the gate chain and hands admitted requests to their handler.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, CredentialStore};
use crate::config::GatewayConfig;
use crate::downstream::{Downstream, DownstreamResponse, UpstreamClient};
use crate::gateway::gate::{AuthGate, Gate, PathGate, RateLimitGate, RequestContext, SanitizeGate};
use crate::gateway::GateError;
use crate::security::path_resolver::PathResolver;
use crate::security::rate_limit::RateLimiter;
use crate::security::sanitizer::InputSanitizer;
use crate::tools::{ToolOutput, ToolRunner};

/// Composition of every gate and downstream handler.
pub struct Dispatcher {
    gates: Vec<Arc<dyn Gate>>,
    gate_timeout: Duration,
    store: CredentialStore,
    limiter: Arc<RateLimiter>,
    resolver: Arc<PathResolver>,
    runner: Arc<ToolRunner>,
    downstream: Downstream,
}

impl Dispatcher {
    /// Build every component from one configuration. Fails if the serving
    /// root cannot be canonicalized or the upstream URL is unusable.
    pub fn new(config: &GatewayConfig, store: CredentialStore) -> Result<Self, GateError> {
        let authenticator = Arc::new(Authenticator::new(store.clone(), &config.auth));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let sanitizer = Arc::new(InputSanitizer::new(&config.sanitizer, &config.tools));
        let resolver = Arc::new(
            PathResolver::new(&config.files).map_err(|e| GateError::Internal(format!("serving root: {}", e)))?,
        );
        let runner = Arc::new(ToolRunner::new(&config.tools));
        let downstream = match &config.upstream.ai_quantum_url {
            Some(url) => Downstream::Upstream(UpstreamClient::new(url, &config.upstream)?),
            None => Downstream::Local,
        };

        // Order is fixed: identity first, then budget, then input.
        let gates: Vec<Arc<dyn Gate>> = vec![
            Arc::new(AuthGate::new(authenticator)),
            Arc::new(RateLimitGate::new(limiter.clone())),
            Arc::new(SanitizeGate::new(sanitizer)),
            Arc::new(PathGate::new(resolver.clone())),
        ];

        Ok(Self {
            gates,
            gate_timeout: Duration::from_millis(config.timeouts.store_timeout_ms),
            store,
            limiter,
            resolver,
            runner,
            downstream,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn runner(&self) -> &ToolRunner {
        &self.runner
    }

    /// Run every gate in order, stopping at the first failure.
    pub async fn admit(&self, mut ctx: RequestContext) -> Result<RequestContext, GateError> {
        for gate in &self.gates {
            ctx = tokio::time::timeout(self.gate_timeout, gate.check(ctx))
                .await
                .map_err(|_| {
                    tracing::error!(gate = gate.name(), "Gate evaluation timed out");
                    GateError::GateTimeout(gate.name())
                })??;
        }
        Ok(ctx)
    }

    /// Admit, then run the sanitized command.
    pub async fn dispatch_tool(&self, ctx: RequestContext) -> Result<(RequestContext, ToolOutput), GateError> {
        let mut ctx = self.admit(ctx).await?;
        let (kind, command) = ctx
            .command
            .take()
            .ok_or_else(|| GateError::Internal("tool request admitted without arguments".to_string()))?;
        let output = self.runner.run(kind, command).await?;
        Ok((ctx, output))
    }

    /// Admit, then read the confined file.
    pub async fn dispatch_file(&self, ctx: RequestContext) -> Result<(RequestContext, Vec<u8>), GateError> {
        let ctx = self.admit(ctx).await?;
        let resolved = ctx
            .resolved
            .as_ref()
            .ok_or_else(|| GateError::Internal("file request admitted without a path".to_string()))?;
        let content = self.resolver.read(resolved).await?;
        Ok((ctx, content))
    }

    /// Admit, then forward to the upstream service or the local stubs.
    pub async fn dispatch_downstream(&self, ctx: RequestContext) -> Result<(RequestContext, DownstreamResponse), GateError> {
        let mut ctx = self.admit(ctx).await?;
        let request = ctx
            .downstream
            .take()
            .ok_or_else(|| GateError::Internal("downstream request admitted without a route".to_string()))?;
        let response = self.downstream.call(request, &ctx.request_id).await?;
        Ok((ctx, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Role};
    use crate::gateway::gate::{Payload, RouteClass};
    use crate::tools::ToolKind;
    use axum::body::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    struct Fixture {
        root: std::path::PathBuf,
        dispatcher: Dispatcher,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn fixture(limit: u32) -> Fixture {
        let root = std::env::temp_dir().join(format!("sgw-dispatch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("report.txt"), b"scan complete").unwrap();

        let mut config = GatewayConfig::default();
        config.files.root = root.to_string_lossy().into_owned();
        config.rate_limit.requests_per_window = limit;
        Fixture {
            dispatcher: Dispatcher::new(&config, CredentialStore::new(None)).unwrap(),
            root,
        }
    }

    fn tool_payload(tool: Option<ToolKind>, body: Bytes) -> Payload {
        Payload::Tool { tool, body }
    }

    fn ctx(route: RouteClass, key: Option<&str>) -> RequestContext {
        RequestContext::new("req-1", IpAddr::V4(Ipv4Addr::LOCALHOST), route, key.map(str::to_string))
    }

    #[tokio::test]
    async fn test_auth_runs_before_sanitizer() {
        let fx = fixture(10);
        let body = Bytes::from_static(br#"{"target":"8.8.8.8; cat /etc/passwd"}"#);
        let err = fx
            .dispatcher
            .admit(ctx(RouteClass::Tool, None).with_payload(tool_payload(Some(ToolKind::Nmap), body)))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Auth(AuthError::Unauthenticated)));

        let err = fx
            .dispatcher
            .admit(ctx(RouteClass::Tool, None).with_payload(tool_payload(None, Bytes::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Auth(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_unknown_tool_after_auth() {
        let fx = fixture(10);
        let issued = fx.dispatcher.store().issue(Role::Analyst, None, None);
        let err = fx
            .dispatcher
            .dispatch_tool(ctx(RouteClass::Tool, Some(&issued.token)).with_payload(tool_payload(None, Bytes::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::UnknownTool));
    }

    #[tokio::test]
    async fn test_injection_rejected_after_auth() {
        let fx = fixture(10);
        let issued = fx.dispatcher.store().issue(Role::Analyst, None, None);
        let body = Bytes::from_static(br#"{"target":"8.8.8.8; cat /etc/passwd","scan_type":"quick"}"#);
        let err = fx
            .dispatcher
            .dispatch_tool(ctx(RouteClass::Tool, Some(&issued.token)).with_payload(tool_payload(Some(ToolKind::Nmap), body)))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Rejected(r) if r.field == "target"));
    }

    #[tokio::test]
    async fn test_viewer_cannot_run_tools() {
        let fx = fixture(10);
        let issued = fx.dispatcher.store().issue(Role::Viewer, None, None);
        let err = fx
            .dispatcher
            .admit(ctx(RouteClass::Tool, Some(&issued.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Auth(AuthError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_key() {
        let fx = fixture(2);
        let issued = fx.dispatcher.store().issue(Role::Viewer, None, None);
        for remaining in [1, 0] {
            let admitted = fx.dispatcher.admit(ctx(RouteClass::Health, Some(&issued.token))).await.unwrap();
            assert_eq!(admitted.admission.unwrap().remaining, remaining);
        }
        let err = fx.dispatcher.admit(ctx(RouteClass::Health, Some(&issued.token))).await.unwrap_err();
        assert!(matches!(err, GateError::RateLimited(_)));

        // Health without a key is never counted.
        for _ in 0..5 {
            let admitted = fx.dispatcher.admit(ctx(RouteClass::Health, None)).await.unwrap();
            assert!(admitted.admission.is_none());
        }
    }

    #[tokio::test]
    async fn test_file_dispatch() {
        let fx = fixture(10);
        let issued = fx.dispatcher.store().issue(Role::Viewer, None, None);
        let (_, content) = fx
            .dispatcher
            .dispatch_file(ctx(RouteClass::File, Some(&issued.token)).with_payload(Payload::File(Some("report.txt".into()))))
            .await
            .unwrap();
        assert_eq!(content, b"scan complete");

        let err = fx
            .dispatcher
            .dispatch_file(
                ctx(RouteClass::File, Some(&issued.token))
                    .with_payload(Payload::File(Some("%2e%2e%2f%2e%2e%2fetc%2fpasswd".into()))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
