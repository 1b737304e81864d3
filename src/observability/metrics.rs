//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_exchanges_total` (counter): exchanges by listen port, method, status
//! - `proxy_exchange_duration_seconds` (histogram): end-to-end exchange latency
//! - `proxy_upstream_errors_total` (counter): forwarding failures by listen port, kind
//! - `proxy_enrichment_total` (counter): enrichment outcomes
//!
//! # Design Decisions
//! - Status label is `none` when the caller left before a status existed
//! - Exporter is opt-in; without it every call here is a cheap no-op

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape listener and install the global recorder.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Same name as the `listen_port` field on log events.
const PORT_LABEL: &str = "listen_port";

fn exchange_labels(listen_port: u16, method: &str, status: Option<u16>) -> [(&'static str, String); 3] {
    let status = status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string());
    [
        (PORT_LABEL, listen_port.to_string()),
        ("method", method.to_string()),
        ("status", status),
    ]
}

pub fn record_exchange(listen_port: u16, method: &str, status: Option<u16>, duration: Duration) {
    let labels = exchange_labels(listen_port, method, status);
    counter!("proxy_exchanges_total", &labels[..]).increment(1);
    histogram!("proxy_exchange_duration_seconds", &labels[..1]).record(duration.as_secs_f64());
}

pub fn record_upstream_error(listen_port: u16, kind: &'static str) {
    counter!(
        "proxy_upstream_errors_total",
        PORT_LABEL => listen_port.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// `outcome` is one of `annotated`, `dropped`, or an enrichment error kind.
pub fn record_enrichment(outcome: &'static str) {
    counter!("proxy_enrichment_total", "outcome" => outcome).increment(1);
}
