//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the security gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// API key authentication.
    pub auth: AuthConfig,

    /// Per-identity fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Grammar limits for tool input fields.
    pub sanitizer: SanitizerConfig,

    /// Confined file serving.
    pub files: FilesConfig,

    /// Security tool adapters.
    pub tools: ToolsConfig,

    /// Downstream AI / quantum service.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Deployment environment.
    pub environment: Environment,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// API key authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require an API key on protected routes.
    pub enabled: bool,

    /// Header carrying the presented key.
    pub header_name: String,

    /// JSON file holding hashed key records.
    pub keys_file: Option<String>,

    /// Reload the keys file when it changes on disk.
    pub watch_keys_file: bool,

    /// Plaintext token registered as an admin key at startup.
    /// Hashed immediately; never written back to disk.
    #[serde(skip_serializing)]
    pub bootstrap_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "X-API-Key".to_string(),
            keys_file: None,
            watch_keys_file: true,
            bootstrap_key: None,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per identity per window.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Windows idle for longer than this are evicted.
    pub idle_eviction_secs: u64,

    /// Interval of the background eviction sweep.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 60,
            idle_eviction_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

/// Input grammar policy for tool fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Maximum length of a scan target.
    pub max_target_len: usize,

    /// Maximum length of a URL field.
    pub max_url_len: usize,

    /// Refuse loopback, private and link-local targets.
    pub deny_private_targets: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_target_len: 253,
            max_url_len: 2048,
            deny_private_targets: false,
        }
    }
}

/// File serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory every file request is confined to.
    pub root: String,

    /// Largest file that will be served.
    pub max_file_bytes: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: "./data/files".to_string(),
            max_file_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// A single tool adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Enable this tool.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Executable to spawn (resolved through PATH when not absolute).
    pub binary: String,

    /// Hard deadline for one invocation.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout() -> u64 {
    300
}

/// Tool adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub nmap: ToolConfig,

    pub gobuster: ToolConfig,

    /// Captured stdout beyond this is truncated.
    pub max_output_bytes: usize,

    /// Concurrent tool processes across all clients.
    pub max_concurrent: usize,

    /// Wordlist registry: identifier → server-side path.
    pub wordlists: BTreeMap<String, String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let mut wordlists = BTreeMap::new();
        wordlists.insert(
            "common".to_string(),
            "/usr/share/wordlists/dirb/common.txt".to_string(),
        );
        wordlists.insert(
            "big".to_string(),
            "/usr/share/wordlists/dirb/big.txt".to_string(),
        );

        Self {
            nmap: ToolConfig {
                enabled: true,
                binary: "nmap".to_string(),
                timeout_secs: 300,
            },
            gobuster: ToolConfig {
                enabled: true,
                binary: "gobuster".to_string(),
                timeout_secs: 300,
            },
            max_output_bytes: 1024 * 1024, // 1MB
            max_concurrent: 4,
            wordlists,
        }
    }
}

/// Downstream AI / quantum service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the AI/quantum service. Local stubs answer when unset.
    pub ai_quantum_url: Option<String>,

    /// Deadline for one forwarded request.
    pub timeout_secs: u64,

    /// Verify the upstream TLS certificate.
    pub verify_tls: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ai_quantum_url: None,
            timeout_secs: 30,
            verify_tls: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for evaluating a single gate.
    pub store_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 360,
            store_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Console output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9100".to_string(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment `{}`", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_secure() {
        let config = GatewayConfig::default();
        assert!(config.auth.enabled);
        assert!(config.upstream.verify_tls);
        assert_eq!(config.rate_limit.requests_per_window, 100);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.auth.header_name, "X-API-Key");
    }

    #[test]
    fn test_partial_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            environment = "production"

            [rate_limit]
            requests_per_window = 5

            [tools.wordlists]
            small = "/srv/wordlists/small.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.rate_limit.requests_per_window, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.tools.wordlists.len(), 1);
        assert_eq!(config.tools.nmap.binary, "nmap");
    }

    #[test]
    fn test_bootstrap_key_not_serialized() {
        let mut config = GatewayConfig::default();
        config.auth.bootstrap_key = Some("sgw_boot.deadbeef".into());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("deadbeef"));
    }
}
