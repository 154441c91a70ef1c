//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.tls set?
//!     yes → tls.rs (load PEM cert/key) → axum-server rustls acceptor
//!     no  → plain tokio TcpListener
//!     → Hand off to HTTP layer
//! ```

pub mod tls;
