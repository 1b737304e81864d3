//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name reported in startup logs.
    pub app_name: String,

    /// Force debug logging regardless of `observability.log_level`.
    pub debug: bool,

    /// Listener configuration (bind host, single-mode port).
    pub listener: ListenerConfig,

    /// Upstream base URL used in single-route mode.
    pub upstream_url: String,

    /// Port (string-encoded) to upstream base URL. When non-empty this is the
    /// whole route table and `listener.port`/`upstream_url` are ignored.
    pub routes: BTreeMap<String, String>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Exchange capture settings.
    pub capture: CaptureConfig,

    /// Optional model-based enrichment of captured exchanges.
    pub enrichment: EnrichmentConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            app_name: "prowlarr-llm-proxy".to_string(),
            debug: false,
            listener: ListenerConfig::default(),
            upstream_url: "http://localhost:8989".to_string(),
            routes: BTreeMap::new(),
            timeouts: TimeoutConfig::default(),
            capture: CaptureConfig::default(),
            enrichment: EnrichmentConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// The raw `(port, upstream)` pairs the route table is built from.
    ///
    /// Multi-port mode when `routes` is non-empty, otherwise the single
    /// `listener.port -> upstream_url` pair. Ports are left string-encoded;
    /// parsing and duplicate detection belong to validation and the route table.
    pub fn route_entries(&self) -> Vec<(String, String)> {
        if self.routes.is_empty() {
            vec![(self.listener.port.to_string(), self.upstream_url.clone())]
        } else {
            self.routes
                .iter()
                .map(|(port, url)| (port.clone(), url.clone()))
                .collect()
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host/IP every listener binds to (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Listen port for single-route mode.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the outbound call, in (fractional) seconds. Also used as
    /// the idle gap allowed between upstream body chunks.
    pub request_secs: f64,

    /// How long listeners may drain in-flight requests after shutdown.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    /// Falls back to the default deadline for values validation rejects.
    pub fn request(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60.0,
            shutdown_grace_secs: 30,
        }
    }
}

/// What the capture sink keeps from each exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Leading bytes of each body kept for logging and enrichment (0 = none).
    pub body_preview_bytes: usize,

    /// Header names whose values are replaced with `<redacted>` in records.
    pub redact_headers: Vec<String>,

    /// Query parameter names whose values are redacted in records.
    pub redact_query_params: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            body_preview_bytes: 3000,
            redact_headers: vec![
                "authorization".to_string(),
                "proxy-authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
            ],
            redact_query_params: vec!["apikey".to_string(), "api_key".to_string()],
        }
    }
}

/// Enrichment hook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Enable enrichment. Has no effect without `api_key`.
    pub enabled: bool,

    /// Provider credential (bearer token).
    pub api_key: Option<String>,

    /// Model identifier sent to the provider.
    pub model: String,

    /// OpenAI-compatible API base URL.
    pub base_url: String,

    /// Deadline for a single provider call in seconds.
    pub timeout_secs: u64,

    /// Capacity of the handoff queue; records beyond it are dropped.
    pub queue_capacity: usize,

    /// Maximum provider calls in flight.
    pub max_concurrency: usize,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Maximum cached annotations (0 disables the cache).
    pub cache_capacity: usize,

    /// Only exchanges whose path starts with one of these are enriched.
    /// Empty means every exchange.
    pub path_prefixes: Vec<String>,
}

impl EnrichmentConfig {
    /// Enrichment runs only when enabled and a non-empty credential is set.
    pub fn is_active(&self) -> bool {
        self.enabled && self.credential().is_some()
    }

    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 30,
            queue_capacity: 256,
            max_concurrency: 4,
            max_tokens: 150,
            temperature: 0.1,
            cache_capacity: 1024,
            path_prefixes: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty console output or JSON lines.
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
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
