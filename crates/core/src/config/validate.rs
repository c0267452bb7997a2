use super::{types::EngineConfig, ConfigError};

/// Sanity-check a loaded configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.fanout.global_concurrency == 0 {
        return Err(ConfigError::Invalid(
            "fanout.global_concurrency must be at least 1".to_string(),
        ));
    }
    if config.fanout.per_provider_concurrency == 0 {
        return Err(ConfigError::Invalid(
            "fanout.per_provider_concurrency must be at least 1".to_string(),
        ));
    }
    if config.fanout.per_provider_concurrency > config.fanout.global_concurrency {
        return Err(ConfigError::Invalid(
            "fanout.per_provider_concurrency cannot exceed fanout.global_concurrency".to_string(),
        ));
    }
    if config.fanout.timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "fanout.timeout_ms must be positive".to_string(),
        ));
    }
    if config.resolver.download_retries == 0 {
        return Err(ConfigError::Invalid(
            "resolver.download_retries must be at least 1".to_string(),
        ));
    }
    if config.resolver.waiter_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "resolver.waiter_timeout_ms must be positive".to_string(),
        ));
    }
    if config.selection.per_provider_cap == 0 {
        return Err(ConfigError::Invalid(
            "selection.per_provider_cap must be at least 1".to_string(),
        ));
    }
    for (id, provider) in &config.providers {
        if let Some(gateway) = &provider.gateway {
            if gateway.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "providers.{id}.gateway.url must not be empty"
                )));
            }
        }
    }
    Ok(())
}
