//! Request-path error kinds.
//!
//! Every variant maps to a well-formed HTTP response so a single bad exchange
//! never leaves a caller without an answer.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced while routing or forwarding one request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// No route is configured for the port the request arrived on.
    #[error("no route configured for port {0}")]
    UnknownPort(u16),

    /// The outbound call failed before a response arrived.
    #[error("upstream {upstream} unreachable: {reason}")]
    UpstreamUnreachable { upstream: String, reason: String },

    /// The upstream did not answer within the configured deadline.
    #[error("upstream {upstream} did not respond within {timeout:?}")]
    UpstreamTimeout { upstream: String, timeout: Duration },
}

impl ProxyError {
    /// Status returned to the original caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnknownPort(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UnknownPort(_) => "unknown_port",
            ProxyError::UpstreamUnreachable { .. } => "unreachable",
            ProxyError::UpstreamTimeout { .. } => "timeout",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::UnknownPort(_) => "No route for port",
            ProxyError::UpstreamUnreachable { .. } => "Proxy error",
            ProxyError::UpstreamTimeout { .. } => "Upstream timeout",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}
