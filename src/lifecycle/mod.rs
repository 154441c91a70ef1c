//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server drains, sweeper and keys
//!     updater exit → keys file saved → process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - Startup order lives in main: config, logging, keys, server

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
