//! Hop-by-hop header handling.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip headers nominated by the `Connection` header
//! - Replace `Host` with the upstream authority on outbound requests
//!
//! # Design Decisions
//! - Everything else passes through untouched, including repeated values
//! - No X-Forwarded-* injection: the proxy is meant to be invisible

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Headers meaningful only for a single transport hop.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// `trailers` is the spelling used by RFC 2616's hop-by-hop list; `trailer`
/// is the actual field name. Both are dropped.
const TRAILERS: HeaderName = HeaderName::from_static("trailers");

/// Remove hop-by-hop headers and any header listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let nominated: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in nominated {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(TRAILERS);
}

/// Prepare inbound headers for the upstream: hop-by-hop removed, `Host`
/// replaced with the upstream's authority.
pub fn outbound_request_headers(mut headers: HeaderMap, upstream_host: &HeaderValue) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    headers.insert(header::HOST, upstream_host.clone());
    headers
}
