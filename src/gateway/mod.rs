//! Request gatekeeping.
//!
//! # Data Flow
//! ```text
//! axum handler builds a RequestContext (request id, client IP, route, raw payload)
//!     → AuthGate      (key → Principal, role check)
//!     → RateLimitGate (Principal identity → Admission)
//!     → SanitizeGate  (tool body → SanitizedCommandArgs, route tail → DownstreamRequest)
//!     → PathGate      (path query → ResolvedPath)
//!     → dispatcher.rs (tool runner / file read / downstream)
//!     → GateError or handler result → HTTP response
//! ```
//!
//! # Design Decisions
//! - The chain is independent of axum; handlers only translate
//! - Gates are evaluated in a fixed order and the first failure wins
//! - Each gate runs under the configured store timeout
//! - Every failure maps to one generic JSON body; raw input is never echoed

pub mod dispatcher;
pub mod error;
pub mod gate;

pub use dispatcher::Dispatcher;
pub use error::GateError;
pub use gate::{Gate, Payload, RequestContext, RouteClass};
