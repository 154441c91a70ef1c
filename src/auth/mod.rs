//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! keys file (JSON, hashed records)
//!     → credentials.rs (CredentialStore, DashMap keyed by key id)
//!     → authenticator.rs (hash presented token, constant-time compare)
//!     → Principal attached to the request context
//!
//! On keys file change:
//!     config/watcher.rs reads the file
//!     → CredentialStore::merge (revocation is sticky)
//! ```
//!
//! # Design Decisions
//! - Plaintext tokens are never stored or logged
//! - Unknown ids still pay for one comparison against a dummy hash
//! - Revoked keys stay in the table for audit

pub mod authenticator;
pub mod credentials;

pub use authenticator::{AuthError, Authenticator, ForbiddenReason, Principal};
pub use credentials::{ApiKey, CredentialStore, IssuedKey, Role};
