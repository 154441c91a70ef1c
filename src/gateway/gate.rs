//! The gates of the request chain.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::Method;

use crate::auth::{Authenticator, Principal, Role};
use crate::downstream::{DownstreamRequest, Service};
use crate::gateway::GateError;
use crate::observability::metrics;
use crate::security::path_resolver::{PathError, PathResolver, ResolvedPath};
use crate::security::rate_limit::{Admission, RateLimitError, RateLimiter};
use crate::security::sanitizer::{InputSanitizer, SanitizedCommandArgs};
use crate::tools::adapters::adapter_for;
use crate::tools::{ToolKind, ToolRequest};

/// Which family of route a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Health,
    Tool,
    File,
    Downstream(Service),
    Admin,
}

impl RouteClass {
    /// Minimum role, or `None` where a key is optional.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            RouteClass::Health => None,
            RouteClass::Tool => Some(Role::Analyst),
            RouteClass::File | RouteClass::Downstream(_) => Some(Role::Viewer),
            RouteClass::Admin => Some(Role::Admin),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Health => "health",
            RouteClass::Tool => "tool",
            RouteClass::File => "file",
            RouteClass::Downstream(_) => "downstream",
            RouteClass::Admin => "admin",
        }
    }
}

/// Unvalidated route input, carried until the gate that owns it.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    /// Tool named in the route (`None` if unknown) and its raw JSON body.
    Tool { tool: Option<ToolKind>, body: Bytes },
    /// Raw, still percent-encoded `path` query value.
    File(Option<String>),
    Downstream { method: Method, tail: String, body: Bytes },
}

/// State threaded through the gates. Each gate fills in what it vouches for.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client: IpAddr,
    pub route: RouteClass,
    pub presented_key: Option<String>,
    pub payload: Payload,
    pub principal: Option<Principal>,
    pub admission: Option<Admission>,
    pub command: Option<(ToolKind, SanitizedCommandArgs)>,
    pub resolved: Option<ResolvedPath>,
    pub downstream: Option<DownstreamRequest>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, client: IpAddr, route: RouteClass, presented_key: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client,
            route,
            presented_key,
            payload: Payload::None,
            principal: None,
            admission: None,
            command: None,
            resolved: None,
            downstream: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    fn key_id(&self) -> &str {
        self.principal.as_ref().and_then(Principal::key_id).unwrap_or("-")
    }
}

/// One step of the chain. A gate either passes the context on, possibly
/// enriched, or stops the request.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, ctx: RequestContext) -> Result<RequestContext, GateError>;
}

/// Verifies the presented key and the route's role requirement.
pub struct AuthGate {
    authenticator: Arc<Authenticator>,
}

impl AuthGate {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl Gate for AuthGate {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn check(&self, mut ctx: RequestContext) -> Result<RequestContext, GateError> {
        let presented = ctx.presented_key.as_deref();
        ctx.principal = match ctx.route.required_role() {
            // Optional key: a valid one is counted, anything else is ignored.
            None => self.authenticator.identify(presented).map(Principal::Key),
            Some(role) => Some(self.authenticator.authenticate(presented, Some(role), ctx.client)?),
        };
        Ok(ctx)
    }
}

/// Counts the request against the principal's window.
pub struct RateLimitGate {
    limiter: Arc<RateLimiter>,
}

impl RateLimitGate {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Gate for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn check(&self, mut ctx: RequestContext) -> Result<RequestContext, GateError> {
        let Some(principal) = &ctx.principal else {
            return Ok(ctx);
        };

        match self.limiter.check(&principal.identity(), principal.rate_limit_override()) {
            Ok(admission) => {
                ctx.admission = Some(admission);
                Ok(ctx)
            }
            Err(err) => {
                let RateLimitError::Exceeded { retry_after_secs, limit } = err;
                tracing::warn!(
                    target: "audit",
                    key_id = ctx.key_id(),
                    client = %ctx.client,
                    route = ctx.route.as_str(),
                    limit,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();
                metrics::record_gate_rejection("rate_limit", "exceeded");
                Err(err.into())
            }
        }
    }
}

/// Validates tool bodies and forwarded route tails.
pub struct SanitizeGate {
    sanitizer: Arc<InputSanitizer>,
}

impl SanitizeGate {
    pub fn new(sanitizer: Arc<InputSanitizer>) -> Self {
        Self { sanitizer }
    }

    fn sanitize(&self, ctx: &mut RequestContext) -> Result<(), GateError> {
        match (&ctx.route, &ctx.payload) {
            (RouteClass::Tool, Payload::Tool { tool, body }) => {
                let kind = tool.ok_or(GateError::UnknownTool)?;
                let request: ToolRequest =
                    serde_json::from_slice(body).map_err(|_| GateError::MalformedBody)?;
                let args = adapter_for(kind).prepare(&request, &self.sanitizer)?;
                ctx.command = Some((kind, args));
            }
            (RouteClass::Downstream(service), Payload::Downstream { method, tail, body }) => {
                let tail = self.sanitizer.route_tail("path", tail)?;
                ctx.downstream = Some(DownstreamRequest {
                    service: *service,
                    method: method.clone(),
                    tail,
                    body: body.clone(),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Gate for SanitizeGate {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn check(&self, mut ctx: RequestContext) -> Result<RequestContext, GateError> {
        match self.sanitize(&mut ctx) {
            Ok(()) => Ok(ctx),
            Err(err) => {
                let (field, reason) = match &err {
                    GateError::Rejected(rejected) => (rejected.field, rejected.reason.as_str()),
                    GateError::UnknownTool => ("tool", "unknown_tool"),
                    _ => ("body", "malformed"),
                };
                tracing::warn!(
                    target: "audit",
                    key_id = ctx.key_id(),
                    client = %ctx.client,
                    route = ctx.route.as_str(),
                    field,
                    reason,
                    "Input rejected"
                );
                metrics::record_gate_rejection("sanitize", reason);
                Err(err)
            }
        }
    }
}

/// Confines file requests to the serving root.
pub struct PathGate {
    resolver: Arc<PathResolver>,
}

impl PathGate {
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Gate for PathGate {
    fn name(&self) -> &'static str {
        "path"
    }

    async fn check(&self, mut ctx: RequestContext) -> Result<RequestContext, GateError> {
        let Payload::File(raw) = &ctx.payload else {
            return Ok(ctx);
        };
        let Some(raw) = raw else {
            metrics::record_gate_rejection("path", "missing");
            return Err(PathError::Malformed.into());
        };

        match self.resolver.resolve(raw).await {
            Ok(resolved) => {
                ctx.resolved = Some(resolved);
                Ok(ctx)
            }
            Err(err) => {
                if matches!(err, PathError::Traversal) {
                    tracing::warn!(
                        target: "audit",
                        key_id = ctx.key_id(),
                        client = %ctx.client,
                        "Path traversal attempt rejected"
                    );
                }
                metrics::record_gate_rejection("path", err.as_str());
                Err(err.into())
            }
        }
    }
}
