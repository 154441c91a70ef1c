//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env (optional, dotenvy)
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, apply environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → passed by reference to each component constructor
//!
//! On keys file change:
//!     watcher.rs detects change
//!     → reads and checks the key records
//!     → CredentialStore merge
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the keys file is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, Environment, FilesConfig, GatewayConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, SanitizerConfig, TimeoutConfig, TlsConfig, ToolConfig,
    ToolsConfig, UpstreamConfig,
};
