//! Security-operations API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                      SEC-GATEWAY                          │
//!  Client Request  │  ┌──────┐   ┌──────────────────── gateway ──────────────┐ │
//!  ────────────────┼─▶│ http │──▶│ auth → rate_limit → sanitize → path       │ │
//!                  │  └──────┘   └───────────────┬───────────────────────────┘ │
//!                  │                             │                             │
//!                  │          ┌──────────────────┼──────────────────┐          │
//!                  │          ▼                  ▼                  ▼          │
//!                  │   ┌────────────┐    ┌──────────────┐   ┌──────────────┐   │
//!                  │   │   tools    │    │ file serving │   │  downstream  │   │
//!                  │   │nmap/gobust.│    │ (confined)   │   │upstream/stubs│   │
//!                  │   └────────────┘    └──────────────┘   └──────────────┘   │
//!                  │                                                          │
//!                  │  Cross-cutting: config · observability · lifecycle · net │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod auth;
pub mod config;
pub mod downstream;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod tools;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
