//! Environment variable overrides.
//!
//! Applied on top of the file (or default) configuration so containerized
//! deployments can configure the proxy with env vars alone. Lookup is
//! injected so tests never touch the process environment.

use std::collections::BTreeMap;

use crate::config::loader::ConfigError;
use crate::config::schema::ProxyConfig;

/// Apply every recognised variable found through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("APP_NAME") {
        config.app_name = v;
    }
    if let Some(v) = lookup("DEBUG") {
        config.debug = parse_bool("DEBUG", &v)?;
    }
    if let Some(v) = lookup("BIND_HOST") {
        config.listener.bind_host = v;
    }
    if let Some(v) = lookup("PORT") {
        config.listener.port = v.trim().parse().map_err(|_| invalid("PORT", &v, "expected a port number"))?;
    }
    if let Some(v) = lookup("UPSTREAM_URL") {
        config.upstream_url = v;
    }
    if let Some(v) = lookup("ROUTES") {
        if !v.trim().is_empty() {
            config.routes = parse_routes(&v)?;
        }
    }
    if let Some(v) = lookup("PROXY_TIMEOUT") {
        config.timeouts.request_secs = v
            .trim()
            .parse()
            .map_err(|_| invalid("PROXY_TIMEOUT", &v, "expected seconds"))?;
    }
    if let Some(v) = lookup("LLM_ENABLED") {
        config.enrichment.enabled = parse_bool("LLM_ENABLED", &v)?;
    }
    if let Some(v) = lookup("OPENAI_API_KEY") {
        config.enrichment.api_key = Some(v);
    }
    if let Some(v) = lookup("OPENAI_MODEL") {
        config.enrichment.model = v;
    }
    if let Some(v) = lookup("OPENAI_BASE_URL") {
        config.enrichment.base_url = v;
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = lookup("LOG_FORMAT") {
        config.observability.log_format = v
            .parse()
            .map_err(|reason: String| invalid("LOG_FORMAT", &v, &reason))?;
    }
    if let Some(v) = lookup("METRICS_ENABLED") {
        config.observability.metrics_enabled = parse_bool("METRICS_ENABLED", &v)?;
    }
    if let Some(v) = lookup("METRICS_ADDRESS") {
        config.observability.metrics_address = v;
    }
    Ok(())
}

/// `ROUTES` is a JSON object of string-encoded port to upstream URL.
fn parse_routes(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    serde_json::from_str(raw).map_err(|e| invalid("ROUTES", raw, &e.to_string()))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(name, raw, "expected a boolean")),
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Env {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
