//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Pick pretty or JSON output from configuration
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - `debug = true` raises the crate's level to debug

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig, debug: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config, debug)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    }
}

fn default_directives(config: &ObservabilityConfig, debug: bool) -> String {
    let level = if debug {
        "debug"
    } else {
        config.log_level.trim()
    };
    format!("prowlarr_llm_proxy={},tower_http=warn", level.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_level() {
        let config = ObservabilityConfig {
            log_level: "WARN".into(),
            ..ObservabilityConfig::default()
        };
        assert_eq!(
            default_directives(&config, false),
            "prowlarr_llm_proxy=warn,tower_http=warn"
        );
        assert_eq!(
            default_directives(&config, true),
            "prowlarr_llm_proxy=debug,tower_http=warn"
        );
    }
}
