//! Port-keyed route table.
//!
//! # Responsibilities
//! - Parse and validate `(port, upstream base URL)` pairs once at startup
//! - Resolve the upstream for the port a request arrived on
//! - Build outbound URIs by verbatim concatenation of base + path/query
//!
//! # Design Decisions
//! - Immutable after construction (shared via Arc, no locking)
//! - Explicit `UnknownPort` rather than a silent default route

use std::collections::BTreeMap;

use axum::http::uri::PathAndQuery;
use axum::http::{HeaderValue, Uri};
use thiserror::Error;

use crate::error::ProxyError;

/// Reasons a route table cannot be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid listen port '{raw}': {reason}")]
    InvalidPort { raw: String, reason: String },

    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),

    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("no routes configured")]
    Empty,
}

/// Parse a string-encoded listen port. Port 0 is rejected because a route
/// must name the port callers connect to.
pub fn parse_port(raw: &str) -> Result<u16, RouteError> {
    let port: u16 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        RouteError::InvalidPort {
            raw: raw.to_string(),
            reason: e.to_string(),
        }
    })?;
    if port == 0 {
        return Err(RouteError::InvalidPort {
            raw: raw.to_string(),
            reason: "port must be non-zero".to_string(),
        });
    }
    Ok(port)
}

/// A validated upstream base URL.
#[derive(Debug, Clone)]
pub struct Upstream {
    /// Base URL without trailing slash; request path/query are appended verbatim.
    base: String,
    /// Value for the outbound `Host` header.
    host: HeaderValue,
}

impl Upstream {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidUpstream {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http upstreams are supported"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("base URL must not carry a query or fragment"));
        }

        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let host = HeaderValue::from_str(&authority).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            base: raw.trim().trim_end_matches('/').to_string(),
            host,
        })
    }

    /// Base URL as configured, minus any trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `Host` header value for requests to this upstream.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host
    }

    /// Outbound URI: base URL followed by the inbound path and query, untouched.
    pub fn target_uri(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, ProxyError> {
        let suffix = path_and_query.map(PathAndQuery::as_str).unwrap_or("/");
        format!("{}{}", self.base, suffix)
            .parse::<Uri>()
            .map_err(|e| ProxyError::UpstreamUnreachable {
                upstream: self.base.clone(),
                reason: format!("cannot build target URI: {}", e),
            })
    }
}

/// Association between a listen port and its upstream.
#[derive(Debug, Clone)]
pub struct Route {
    pub listen_port: u16,
    pub upstream: Upstream,
}

/// Immutable mapping from listen port to upstream, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: BTreeMap<u16, Route>,
}

impl RouteTable {
    /// Build from string-encoded `(port, url)` pairs. Fails on the first
    /// malformed port or URL, or on a port that appears twice.
    pub fn new<I, P, U>(entries: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = (P, U)>,
        P: AsRef<str>,
        U: AsRef<str>,
    {
        let mut routes = BTreeMap::new();
        for (port, url) in entries {
            let listen_port = parse_port(port.as_ref())?;
            let upstream = Upstream::parse(url.as_ref())?;
            if routes
                .insert(listen_port, Route { listen_port, upstream })
                .is_some()
            {
                return Err(RouteError::DuplicatePort(listen_port));
            }
        }

        if routes.is_empty() {
            return Err(RouteError::Empty);
        }
        Ok(Self { routes })
    }

    /// Look up the route for the port a request arrived on.
    pub fn resolve(&self, listen_port: u16) -> Result<&Route, ProxyError> {
        self.routes
            .get(&listen_port)
            .ok_or(ProxyError::UnknownPort(listen_port))
    }

    /// Configured listen ports in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.routes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
