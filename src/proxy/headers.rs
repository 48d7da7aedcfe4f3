//! Header utilities for upstream forwarding
//!
//! Hop-by-hop and connection-managed headers are stripped in both
//! directions; everything else passes through untouched.

use axum::http::header::{self, HeaderMap, HeaderName};

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
}

/// Copy inbound headers onto an outbound request.
///
/// `host` is dropped so the client stack derives it from the target URL, and
/// `content-length` is dropped because the outbound body is re-framed.
pub fn copy_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in inbound {
        if is_hop_by_hop_header(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers
}

/// Filter hop-by-hop headers from an upstream response before relaying it.
/// `content-length` is dropped for the same re-framing reason as above.
pub fn filter_response_headers(response_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for (name, value) in response_headers {
        if is_hop_by_hop_header(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }

    filtered
}
