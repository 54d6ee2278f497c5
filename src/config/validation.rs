use super::{AppConfig, ConfigError, FallbackTier};
use crate::protocol::upstream::RESERVED_UPSTREAM_FIELDS;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout_secs == 0 {
        return Err(validation_err("server.timeout_secs must be greater than 0"));
    }
    if server.probe_timeout_secs == 0 {
        return Err(validation_err(
            "server.probe_timeout_secs must be greater than 0",
        ));
    }
    if server.stream_idle_timeout_secs == Some(0) {
        return Err(validation_err(
            "server.stream_idle_timeout_secs must be greater than 0 when set",
        ));
    }
    if server.runtime_worker_threads == Some(0) {
        return Err(validation_err(
            "server.runtime_worker_threads must be greater than 0 when set",
        ));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err(
            "upstream.api_key is required; refusing to start without a credential",
        ));
    }
    let parsed = url::Url::parse(&upstream.base_url).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if !upstream.default_temperature.is_finite() || upstream.default_temperature < 0.0 {
        return Err(validation_err(
            "upstream.default_temperature must be a non-negative number",
        ));
    }
    if upstream.default_max_tokens == 0 {
        return Err(validation_err(
            "upstream.default_max_tokens must be greater than 0",
        ));
    }
    if let Some(field) = upstream
        .reasoning_directive
        .keys()
        .find(|key| RESERVED_UPSTREAM_FIELDS.contains(&key.as_str()))
    {
        return Err(validation_err(format!(
            "upstream.reasoning_directive cannot override '{field}'"
        )));
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    for (alias, target) in &config.models.aliases {
        if alias.trim().is_empty() || target.trim().is_empty() {
            return Err(validation_err(format!(
                "Invalid alias '{alias}' -> '{target}'. Both sides must not be empty."
            )));
        }
    }

    if config.models.memo_capacity == 0 {
        return Err(validation_err("models.memo_capacity must be greater than 0"));
    }

    let fallback = &config.models.fallback;
    validate_tier("large", &fallback.large)?;
    validate_tier("medium", &fallback.medium)?;
    validate_tier("small", &fallback.small)?;
    Ok(())
}

fn validate_tier(name: &str, tier: &FallbackTier) -> Result<(), ConfigError> {
    if tier.model.trim().is_empty() {
        return Err(validation_err(format!(
            "models.fallback.{name}.model cannot be empty"
        )));
    }
    if tier.markers.iter().any(|marker| marker.trim().is_empty()) {
        return Err(validation_err(format!(
            "models.fallback.{name}.markers contains an empty marker"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
