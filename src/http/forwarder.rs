//! Transparent forwarding to an upstream.
//!
//! # Responsibilities
//! - Build the outbound request: base URL + inbound path/query verbatim,
//!   filtered headers, streamed body
//! - Bound the wait for upstream response headers by the request timeout
//! - Stream the upstream response back while counting bytes
//! - Turn every upstream fault into a gateway response
//!
//! # Data Flow
//! ```text
//! inbound Request<Body>
//!     → CaptureSink::begin → InFlight
//!     → CountingBody(request tap) → hyper client (timeout)
//!         Err / elapsed → 502 / 504, InFlight::finish(error)
//!         Ok            → CountingBody(response tap, idle timeout)
//!                           on stream end → InFlight::finish
//! ```
//!
//! # Design Decisions
//! - No buffering in either direction; bodies are wrapped, not collected
//! - Dropping the handler future drops the outbound call (cancellation)
//! - No retries: requests may not be idempotent

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::capture::{CaptureSink, InFlight};
use crate::error::ProxyError;
use crate::http::body::{BodyOutcome, CountingBody};
use crate::http::headers::{outbound_request_headers, strip_hop_by_hop};
use crate::observability::metrics;
use crate::routing::Upstream;

/// Shared outbound client plus the per-request deadline.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    sink: CaptureSink,
}

impl Forwarder {
    pub fn new(timeout: Duration, sink: CaptureSink) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout,
            sink,
        }
    }

    /// Forward one request. Always yields a response.
    pub async fn forward(
        &self,
        listen_port: u16,
        upstream: &Upstream,
        request: Request<Body>,
    ) -> Response<Body> {
        let mut in_flight = self.sink.begin(&request, listen_port, upstream.base());

        let (parts, body) = request.into_parts();
        let uri = match upstream.target_uri(parts.uri.path_and_query()) {
            Ok(uri) => uri,
            Err(err) => return fail(listen_port, in_flight, err),
        };

        tracing::debug!(
            exchange_id = %in_flight.id(),
            method = %parts.method,
            target = %uri,
            "Forwarding request"
        );

        let mut outbound = Request::new(Body::new(CountingBody::new(body, in_flight.request_tap())));
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = outbound_request_headers(parts.headers, upstream.host_header());

        let response: Response<Incoming> = match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = ProxyError::UpstreamUnreachable {
                    upstream: upstream.base().to_string(),
                    reason: error_chain(&e),
                };
                return fail(listen_port, in_flight, err);
            }
            Err(_) => {
                let err = ProxyError::UpstreamTimeout {
                    upstream: upstream.base().to_string(),
                    timeout: self.timeout,
                };
                return fail(listen_port, in_flight, err);
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        in_flight.record_response(parts.status, &parts.headers);

        let upstream_base = upstream.base().to_string();
        let timeout = self.timeout;
        let body = CountingBody::new(body, in_flight.response_tap())
            .with_idle_timeout(timeout)
            .on_complete(move |outcome| {
                if matches!(outcome, BodyOutcome::TimedOut(_)) {
                    metrics::record_upstream_error(listen_port, "timeout");
                }
                in_flight.finish(outcome_error(outcome, &upstream_base, timeout));
            });

        Response::from_parts(parts, Body::new(body))
    }
}

/// Answer the caller with the error's gateway response and seal the record.
fn fail(listen_port: u16, mut in_flight: InFlight, err: ProxyError) -> Response<Body> {
    tracing::warn!(
        exchange_id = %in_flight.id(),
        listen_port,
        error = %err,
        "Upstream request failed"
    );
    metrics::record_upstream_error(listen_port, err.kind());

    let response = err.clone().into_response();
    in_flight.record_response(response.status(), response.headers());
    in_flight.finish(Some(err.to_string()));
    response
}

/// Record error for how the response stream ended.
fn outcome_error(outcome: BodyOutcome, upstream: &str, timeout: Duration) -> Option<String> {
    match outcome {
        BodyOutcome::Completed => None,
        BodyOutcome::Failed(reason) => Some(format!("upstream body failed: {}", reason)),
        BodyOutcome::TimedOut(_) => Some(
            ProxyError::UpstreamTimeout {
                upstream: upstream.to_string(),
                timeout,
            }
            .to_string(),
        ),
        BodyOutcome::Aborted => {
            Some("client disconnected before the response body completed".to_string())
        }
    }
}

/// `Display` of an error and all of its sources, joined by `: `.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.1.as_deref().map(|e| e as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = Layer(
            "client error (Connect)",
            Some(Box::new(Layer("tcp connect error", Some(Box::new(Layer("Connection refused", None)))))),
        );
        assert_eq!(
            error_chain(&err),
            "client error (Connect): tcp connect error: Connection refused"
        );
    }

    #[test]
    fn body_outcomes_map_to_record_errors() {
        let timeout = Duration::from_secs(60);
        assert_eq!(outcome_error(BodyOutcome::Completed, "http://a", timeout), None);

        let text = outcome_error(BodyOutcome::TimedOut(timeout), "http://a", timeout);
        assert!(text.is_some_and(|t| t.contains("did not respond")));

        let text = outcome_error(BodyOutcome::Aborted, "http://a", timeout);
        assert!(text.is_some_and(|t| t.contains("client disconnected")));

        let text = outcome_error(BodyOutcome::Failed("reset".into()), "http://a", timeout);
        assert_eq!(text.as_deref(), Some("upstream body failed: reset"));
    }
}
