//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: `{value}`")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then environment overrides,
/// then semantic validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply recognized environment variables on top of `config`.
///
/// `lookup` abstracts the process environment so overrides can be tested
/// without mutating global state.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("API_AUTH_ENABLED") {
        config.auth.enabled = parse_bool("API_AUTH_ENABLED", &value)?;
    }
    if let Some(value) = lookup("RATE_LIMIT_PER_MINUTE") {
        config.rate_limit.requests_per_window = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "RATE_LIMIT_PER_MINUTE", value: value.clone() })?;
        config.rate_limit.window_secs = 60;
    }
    if let Some(value) = lookup("DISABLE_SSL_VERIFY") {
        config.upstream.verify_tls = !parse_bool("DISABLE_SSL_VERIFY", &value)?;
    }
    if let Some(value) = lookup("FILE_SERVE_ROOT") {
        config.files.root = value;
    }
    if let Some(value) = lookup("GATEWAY_BIND") {
        config.listener.bind_address = value;
    }
    if let Some(value) = lookup("GATEWAY_KEYS_FILE") {
        config.auth.keys_file = Some(value);
    }
    if let Some(value) = lookup("GATEWAY_BOOTSTRAP_KEY") {
        if !value.trim().is_empty() {
            config.auth.bootstrap_key = Some(value);
        }
    }
    if let Some(value) = lookup("AI_QUANTUM_URL") {
        config.upstream.ai_quantum_url = if value.trim().is_empty() { None } else { Some(value) };
    }
    if let Some(value) = lookup("ENVIRONMENT") {
        config.environment = value
            .parse()
            .map_err(|_| ConfigError::Env { var: "ENVIRONMENT", value: value.clone() })?;
    }
    if let Some(value) = lookup("LOG_LEVEL") {
        config.observability.log_level = value.to_ascii_lowercase();
    }
    if let Some(value) = lookup("LOG_FORMAT") {
        config.observability.log_format = match value.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value }),
        };
    }

    Ok(())
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { var, value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("API_AUTH_ENABLED", "false"),
                ("RATE_LIMIT_PER_MINUTE", "7"),
                ("FILE_SERVE_ROOT", "/srv/files"),
                ("LOG_FORMAT", "json"),
                ("AI_QUANTUM_URL", "http://127.0.0.1:8000"),
            ]),
        )
        .unwrap();

        assert!(!config.auth.enabled);
        assert_eq!(config.rate_limit.requests_per_window, 7);
        assert_eq!(config.files.root, "/srv/files");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.upstream.ai_quantum_url.as_deref(), Some("http://127.0.0.1:8000"));
        assert!(config.upstream.verify_tls);
    }

    #[test]
    fn test_disable_ssl_verify_must_be_explicit() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, env(&[("DISABLE_SSL_VERIFY", "false")])).unwrap();
        assert!(config.upstream.verify_tls);

        apply_env_overrides(&mut config, env(&[("DISABLE_SSL_VERIFY", "true")])).unwrap();
        assert!(!config.upstream.verify_tls);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("RATE_LIMIT_PER_MINUTE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "RATE_LIMIT_PER_MINUTE", .. }));

        let err = apply_env_overrides(&mut config, env(&[("API_AUTH_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "API_AUTH_ENABLED", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("sgw-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gateway.toml");
        std::fs::write(
            &path,
            format!(
                "[files]\nroot = \"{}\"\n\n[rate_limit]\nrequests_per_window = 3\n",
                dir.display()
            ),
        )
        .unwrap();

        let mut config: GatewayConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config.rate_limit.requests_per_window, 3);
        assert!(validate_config(&config).is_ok());

        std::fs::remove_dir_all(&dir).unwrap_or_default();
    }
}
