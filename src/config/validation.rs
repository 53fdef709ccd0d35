use super::{AppConfig, ConfigError};
use crate::protocol::prompt::SYSTEM_PROMPT_PLACEHOLDER;

/// Validate the full application config, returning an error if any rule is violated.
///
/// The credential is deliberately not checked here: its absence is reported
/// per request.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_prompt_template(config)?;
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
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.max_request_body_bytes == 0 {
        return Err(validation_err(
            "server.max_request_body_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let parsed = url::Url::parse(&upstream.base_url).map_err(|err| {
        validation_err(format!("upstream.base_url is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if upstream.reasoning_model.trim().is_empty() {
        return Err(validation_err("upstream.reasoning_model cannot be empty"));
    }
    if upstream.chat_model.trim().is_empty() {
        return Err(validation_err("upstream.chat_model cannot be empty"));
    }
    if upstream.max_tokens == 0 {
        return Err(validation_err("upstream.max_tokens must be greater than 0"));
    }
    if !(0.0..=2.0).contains(&upstream.temperature) {
        return Err(validation_err(
            "upstream.temperature must be between 0 and 2",
        ));
    }
    validate_proxy_url(upstream.proxy.as_deref())
}

fn validate_proxy_url(proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy.map(str::trim) else {
        return Ok(());
    };
    if proxy.is_empty() {
        return Err(validation_err("upstream.proxy cannot be empty when set"));
    }
    let parsed = url::Url::parse(proxy)
        .map_err(|err| validation_err(format!("upstream.proxy is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.proxy must use http:// or https://",
        ));
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

fn validate_prompt_template(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(ref tmpl) = config.features.reasoning_prompt_template {
        if !tmpl.contains(SYSTEM_PROMPT_PLACEHOLDER) {
            return Err(validation_err(
                "reasoning_prompt_template must contain the {system_prompt} placeholder",
            ));
        }
    }
    Ok(())
}
