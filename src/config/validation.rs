//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that the file root exists and is a directory
//! - Refuse insecure settings in production
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::{Environment, GatewayConfig};
use crate::security::sanitizer::is_registry_identifier;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a fully-loaded configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address such as 0.0.0.0:8888",
        ));
    }

    if config.auth.header_name.trim().is_empty() {
        errors.push(ValidationError::new("auth.header_name", "must not be empty"));
    } else if axum::http::HeaderName::from_bytes(config.auth.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::new("auth.header_name", "is not a valid header name"));
    }

    if config.rate_limit.requests_per_window == 0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_window",
            "must be greater than 0",
        ));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
    if config.rate_limit.idle_eviction_secs < config.rate_limit.window_secs {
        errors.push(ValidationError::new(
            "rate_limit.idle_eviction_secs",
            "must be at least window_secs",
        ));
    }

    let root = Path::new(&config.files.root);
    if !root.is_dir() {
        errors.push(ValidationError::new(
            "files.root",
            format!("`{}` does not exist or is not a directory", config.files.root),
        ));
    }

    for (name, tool) in [("nmap", &config.tools.nmap), ("gobuster", &config.tools.gobuster)] {
        if tool.timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("tools.{}.timeout_secs", name),
                "must be greater than 0",
            ));
        }
        if tool.binary.trim().is_empty() {
            errors.push(ValidationError::new(format!("tools.{}.binary", name), "must not be empty"));
        }
    }
    if config.tools.max_concurrent == 0 {
        errors.push(ValidationError::new("tools.max_concurrent", "must be greater than 0"));
    }
    for id in config.tools.wordlists.keys() {
        if !is_registry_identifier(id) {
            errors.push(ValidationError::new(
                format!("tools.wordlists.{}", id),
                "identifier must match [a-z0-9][a-z0-9_-]{0,63}",
            ));
        }
    }

    if let Some(url) = &config.upstream.ai_quantum_url {
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                "upstream.ai_quantum_url",
                "must be an absolute http(s) URL",
            )),
        }
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    // The request deadline must outlive every inner deadline so those map
    // to their own 504 bodies first.
    let inner = [
        ("tools.nmap.timeout_secs", config.tools.nmap.timeout_secs),
        ("tools.gobuster.timeout_secs", config.tools.gobuster.timeout_secs),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
    ];
    for (field, secs) in inner {
        if config.timeouts.request_secs <= secs {
            errors.push(ValidationError::new(
                "timeouts.request_secs",
                format!("must be greater than {} ({})", field, secs),
            ));
        }
    }
    if config.timeouts.store_timeout_ms == 0 {
        errors.push(ValidationError::new("timeouts.store_timeout_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if config.environment == Environment::Production {
        if !config.upstream.verify_tls {
            errors.push(ValidationError::new(
                "upstream.verify_tls",
                "TLS verification cannot be disabled in production",
            ));
        }
        if !config.auth.enabled {
            errors.push(ValidationError::new(
                "auth.enabled",
                "authentication cannot be disabled in production",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.files.root = std::env::temp_dir().to_string_lossy().into_owned();
        config
    }

    #[test]
    fn test_default_with_existing_root_is_valid() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.rate_limit.requests_per_window = 0;
        config.tools.nmap.timeout_secs = 0;
        config.files.root = "/definitely/not/here".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rate_limit.requests_per_window"));
        assert!(fields.contains(&"tools.nmap.timeout_secs"));
        assert!(fields.contains(&"files.root"));
    }

    #[test]
    fn test_bad_wordlist_identifier() {
        let mut config = valid_config();
        config
            .tools
            .wordlists
            .insert("../etc".into(), "/etc/passwd".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.starts_with("tools.wordlists."));
    }

    #[test]
    fn test_request_deadline_must_outlive_inner_deadlines() {
        let mut config = valid_config();
        config.timeouts.request_secs = 1;
        config.tools.nmap.timeout_secs = 3;
        config.tools.gobuster.timeout_secs = 1;
        config.upstream.timeout_secs = 1;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.field == "timeouts.request_secs"));
        assert!(errors[0].message.contains("tools.nmap.timeout_secs"));

        config.timeouts.request_secs = 4;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_production_refuses_insecure_settings() {
        let mut config = valid_config();
        config.environment = Environment::Production;
        config.upstream.verify_tls = false;
        config.auth.enabled = false;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);

        config.environment = Environment::Development;
        assert!(validate_config(&config).is_ok());
    }
}
