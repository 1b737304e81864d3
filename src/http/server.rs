//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create one Axum Router per listener, bound to that listener's port
//! - Answer health probes locally, forward everything else
//! - Wire up per-request tracing spans
//! - Run every listener under the supervisor with graceful shutdown

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::capture::CaptureSink;
use crate::config::ProxyConfig;
use crate::health::{self, HEALTH_PATH, LIVE_PATH, READY_PATH};
use crate::http::forwarder::Forwarder;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::supervisor::Supervisor;
use crate::net::{ListenerSet, PortListener};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Port the listener serving this router was configured with.
    pub listen_port: u16,
    pub routes: Arc<RouteTable>,
    pub forwarder: Forwarder,
}

/// HTTP server for the reverse proxy.
pub struct ProxyServer {
    routes: Arc<RouteTable>,
    forwarder: Forwarder,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig, routes: Arc<RouteTable>, sink: CaptureSink) -> Self {
        Self {
            routes,
            forwarder: Forwarder::new(config.timeouts.request(), sink),
        }
    }

    /// Build the Axum router for one listen port.
    pub fn router_for(&self, listen_port: u16) -> Router {
        let state = AppState {
            listen_port,
            routes: self.routes.clone(),
            forwarder: self.forwarder.clone(),
        };

        Router::new()
            .route(HEALTH_PATH, get(health::overall).fallback(proxy_handler))
            .route(LIVE_PATH, get(health::live).fallback(proxy_handler))
            .route(READY_PATH, get(health::ready).fallback(proxy_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        listen_port,
                        method = %request.method(),
                        path = %request.uri().path()
                    )
                }),
            )
    }

    /// Hand every bound listener to the supervisor.
    pub fn spawn_listeners(&self, listeners: ListenerSet, supervisor: &mut Supervisor) {
        for listener in listeners {
            let port = listener.port();
            let router = self.router_for(port);
            let shutdown = supervisor.shutdown().clone();
            supervisor.spawn(port, serve(listener, router, shutdown));
        }
    }
}

/// Serve one listener until `shutdown`, then wait for its in-flight requests.
pub async fn serve(listener: PortListener, router: Router, shutdown: Shutdown) -> io::Result<()> {
    let port = listener.port();
    let addr = listener.local_addr()?;
    tracing::info!(listen_port = port, address = %addr, "Listener accepting connections");

    axum::serve(listener.into_inner(), router)
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    tracing::info!(listen_port = port, "Listener stopped");
    Ok(())
}

/// Resolve the route for this listener and forward.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let route = match state.routes.resolve(state.listen_port) {
        Ok(route) => route,
        Err(err) => {
            tracing::error!(listen_port = state.listen_port, error = %err, "No route for listener");
            metrics::record_upstream_error(state.listen_port, err.kind());
            return err.into_response();
        }
    };

    state
        .forwarder
        .forward(state.listen_port, &route.upstream, request)
        .await
}
