use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_providers(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.stream_idle_timeout_secs == 0 {
        return Err(validation_err(
            "server.stream_idle_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_providers(config: &AppConfig) -> Result<(), ConfigError> {
    if config.providers.is_empty() {
        return Err(validation_err("providers cannot be empty"));
    }

    let mut seen_names = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err(validation_err("provider name cannot be empty"));
        }
        if !seen_names.insert(provider.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate provider name '{}'",
                provider.name
            )));
        }

        let parsed = url::Url::parse(&provider.base_url).map_err(|err| {
            validation_err(format!(
                "provider '{}' has invalid base_url: {err}",
                provider.name
            ))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(validation_err(format!(
                "provider '{}' base_url must be http(s)",
                provider.name
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "invalid log_level '{}'",
            config.features.log_level
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeaturesConfig, ProviderConfig, ProviderWireKind, ServerConfig};

    fn base_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            providers: vec![ProviderConfig {
                name: "google".to_string(),
                kind: ProviderWireKind::Gemini,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                description: String::new(),
            }],
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn empty_providers_rejected() {
        let mut config = base_config();
        config.providers.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn duplicate_provider_names_rejected() {
        let mut config = base_config();
        let duplicate = config.providers[0].clone();
        config.providers.push(duplicate);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn invalid_base_url_rejected() {
        let mut config = base_config();
        config.providers[0].base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());

        config.providers[0].base_url = "ftp://example.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let mut config = base_config();
        config.server.stream_idle_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bogus_log_level_rejected() {
        let mut config = base_config();
        config.features.log_level = "CHATTY".to_string();
        assert!(validate_config(&config).is_err());
    }
}
