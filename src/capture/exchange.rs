//! Exchange records and their in-flight owner.
//!
//! # Lifecycle
//! ```text
//! CaptureSink::begin      → InFlight (owns the record, exclusive to the handler)
//!     forwarder            → record_response / body taps count bytes
//!     finish | drop        → sealed ExchangeRecord handed to the sink, never mutated again
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Request, StatusCode};
use serde::Serialize;

use crate::capture::decode::decode_prefix;
use crate::capture::sink::CaptureSink;
use crate::http::body::BodyTap;

pub const REDACTED: &str = "<redacted>";

/// Correlation token for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub const HEADER: &'static str = "x-request-id";

    /// Reuse the caller's `x-request-id` when present, else mint a UUID v4.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(Self::HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(|| Self(uuid::Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary of one inbound request and its forwarding attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    pub id: ExchangeId,
    pub method: String,
    pub path: String,
    /// Query string with sensitive parameters redacted.
    pub query: Option<String>,
    pub listen_port: u16,
    pub upstream: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body_size: u64,
    pub request_body_preview: Option<String>,
    /// Status sent to the caller; `None` if the caller left before one existed.
    pub response_status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body_size: u64,
    pub response_body_preview: Option<String>,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ExchangeRecord {
    pub fn started_at_unix_ms(&self) -> u128 {
        self.started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

/// Which parts of an exchange are kept, and which are masked.
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    pub preview_limit: usize,
    redact_headers: HashSet<HeaderName>,
    redact_query: HashSet<String>,
}

impl CapturePolicy {
    pub fn new(preview_limit: usize, redact_headers: &[String], redact_query: &[String]) -> Self {
        Self {
            preview_limit,
            redact_headers: redact_headers
                .iter()
                .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
                .collect(),
            redact_query: redact_query.iter().map(|p| p.to_ascii_lowercase()).collect(),
        }
    }

    pub fn headers(&self, headers: &HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if self.redact_headers.contains(name) {
                    REDACTED.to_string()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_string(), value)
            })
            .collect()
    }

    pub fn query(&self, query: &str) -> String {
        query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if self.redact_query.contains(&key.to_ascii_lowercase()) => {
                    format!("{}={}", key, REDACTED)
                }
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        let config = crate::config::CaptureConfig::default();
        Self::new(
            config.body_preview_bytes,
            &config.redact_headers,
            &config.redact_query_params,
        )
    }
}

/// Owner of an exchange record while its request is being handled.
///
/// Sealed exactly once: explicitly via [`InFlight::finish`], or on drop when
/// the handler is cancelled because the caller disconnected.
pub struct InFlight {
    id: ExchangeId,
    record: Option<ExchangeRecord>,
    started: Instant,
    request_tap: Arc<BodyTap>,
    response_tap: Arc<BodyTap>,
    request_encoding: Option<String>,
    response_encoding: Option<String>,
    sink: CaptureSink,
}

impl InFlight {
    pub(crate) fn begin<B>(
        request: &Request<B>,
        listen_port: u16,
        upstream: &str,
        sink: CaptureSink,
    ) -> Self {
        let policy = sink.policy();
        let record = ExchangeRecord {
            id: ExchangeId::from_headers(request.headers()),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(|q| policy.query(q)),
            listen_port,
            upstream: upstream.to_string(),
            request_headers: policy.headers(request.headers()),
            request_body_size: 0,
            request_body_preview: None,
            response_status: None,
            response_headers: Vec::new(),
            response_body_size: 0,
            response_body_preview: None,
            started_at: SystemTime::now(),
            duration: Duration::ZERO,
            error: None,
        };

        let preview_limit = policy.preview_limit;
        Self {
            id: record.id.clone(),
            record: Some(record),
            started: Instant::now(),
            request_tap: Arc::new(BodyTap::new(preview_limit)),
            response_tap: Arc::new(BodyTap::new(preview_limit)),
            request_encoding: content_encoding(request.headers()),
            response_encoding: None,
            sink,
        }
    }

    pub fn id(&self) -> &ExchangeId {
        &self.id
    }

    pub fn request_tap(&self) -> Arc<BodyTap> {
        self.request_tap.clone()
    }

    pub fn response_tap(&self) -> Arc<BodyTap> {
        self.response_tap.clone()
    }

    /// Note the status and (already filtered) headers sent back to the caller.
    pub fn record_response(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.response_encoding = content_encoding(headers);
        let captured = self.sink.policy().headers(headers);
        if let Some(record) = self.record.as_mut() {
            record.response_status = Some(status.as_u16());
            record.response_headers = captured;
        }
    }

    /// Seal the record and hand it to the sink.
    pub fn finish(mut self, error: Option<String>) {
        self.seal(error);
    }

    fn seal(&mut self, error: Option<String>) {
        let Some(mut record) = self.record.take() else {
            return;
        };

        record.request_body_size = self.request_tap.bytes();
        record.request_body_preview =
            preview(&self.request_tap, self.request_encoding.as_deref());
        record.response_body_size = self.response_tap.bytes();
        record.response_body_preview =
            preview(&self.response_tap, self.response_encoding.as_deref());
        record.duration = self.started.elapsed();
        record.error = error;

        self.sink.capture(record);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.record.is_some() {
            self.seal(Some("client disconnected before the exchange completed".to_string()));
        }
    }
}

fn content_encoding(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v != "identity")
}

/// Encoded previews are decoded when possible; otherwise a marker is kept.
fn preview(tap: &BodyTap, encoding: Option<&str>) -> Option<String> {
    match encoding {
        Some(encoding) if tap.bytes() > 0 => {
            match decode_prefix(&tap.raw_preview(), encoding, tap.preview_limit()) {
                Some(decoded) => Some(String::from_utf8_lossy(&decoded).into_owned()),
                None => Some(format!(
                    "<{} bytes, content-encoding: {}>",
                    tap.bytes(),
                    encoding
                )),
            }
        }
        _ => tap.preview(),
    }
}
