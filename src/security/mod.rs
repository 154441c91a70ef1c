//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (body size cap, before anything is buffered)
//!     → [auth gate]
//!     → rate_limit.rs (fixed window per identity)
//!     → sanitizer.rs (tool fields against allow-list grammars)
//!       or path_resolver.rs (file path confined to the serving root)
//!     → headers.rs (security headers on every response)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Reject, never repair: nothing is escaped or rewritten into validity
//! - No trust in client input, including already-decoded paths

pub mod headers;
pub mod limits;
pub mod path_resolver;
pub mod rate_limit;
pub mod sanitizer;
