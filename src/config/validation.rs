//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, capacities > 0)
//! - Detect duplicate listen ports and malformed upstream URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::routing::{parse_port, Upstream};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
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

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_host",
            format!("'{}' is not an IP address", config.listener.bind_host),
        ));
    }

    let mut seen: HashMap<u16, String> = HashMap::new();
    for (raw_port, url) in config.route_entries() {
        let field = format!("routes.{}", raw_port);
        match parse_port(&raw_port) {
            Ok(port) => {
                if let Some(previous) = seen.insert(port, raw_port.clone()) {
                    errors.push(ValidationError::new(
                        field.clone(),
                        format!("port {} already configured as '{}'", port, previous),
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new(field.clone(), e.to_string())),
        }
        if let Err(e) = Upstream::parse(&url) {
            errors.push(ValidationError::new(field, e.to_string()));
        }
    }

    match Duration::try_from_secs_f64(config.timeouts.request_secs) {
        Ok(timeout) if !timeout.is_zero() => {}
        _ => errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be a positive number of seconds that fits a duration",
        )),
    }

    let enrichment = &config.enrichment;
    if enrichment.queue_capacity == 0 {
        errors.push(ValidationError::new("enrichment.queue_capacity", "must be > 0"));
    }
    if enrichment.max_concurrency == 0 {
        errors.push(ValidationError::new("enrichment.max_concurrency", "must be > 0"));
    }
    if enrichment.timeout_secs == 0 {
        errors.push(ValidationError::new("enrichment.timeout_secs", "must be > 0"));
    }
    if enrichment.is_active() && url::Url::parse(&enrichment.base_url).is_err() {
        errors.push(ValidationError::new(
            "enrichment.base_url",
            format!("'{}' is not a valid URL", enrichment.base_url),
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
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

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_host = "everywhere".into();
        config.routes.insert("8585".into(), "http://sonarr:8989".into());
        config.routes.insert("08585".into(), "http://radarr:7878".into());
        config.routes.insert("abc".into(), "ftp://nowhere".into());
        config.timeouts.request_secs = 0.0;
        config.enrichment.queue_capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"listener.bind_host"));
        assert!(fields.contains(&"timeouts.request_secs"));
        assert!(fields.contains(&"enrichment.queue_capacity"));
        // duplicate port, bad port, bad URL
        assert_eq!(fields.iter().filter(|f| f.starts_with("routes.")).count(), 3);
    }

    #[test]
    fn request_timeout_must_fit_a_duration() {
        let mut config = ProxyConfig::default();
        for bad in [1e20, f64::INFINITY, f64::NAN, -1.0, 1e-12] {
            config.timeouts.request_secs = bad;
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors[0].field, "timeouts.request_secs", "{bad}");
        }

        config.timeouts.request_secs = 0.25;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
