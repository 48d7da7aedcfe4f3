//! Proxy forward handler
//!
//! The fallback route: any path not claimed by the admin/health/metrics
//! surface is dispatched to a provider, rewritten, forwarded, and its
//! outcome recorded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use http_body_util::BodyExt;
use tracing::{error, info};

use crate::{
    error::AppError,
    proxy::{split_provider_path, transform, ForwardError, UpstreamResponse},
    proxy::headers::filter_response_headers,
    routes::metrics::record_forward,
    usage::{is_success, RecordedCall},
    AppState,
};

/// Headers whose values never belong in the audit trail
const REDACTED_HEADERS: &[&str] = &["authorization", "x-api-key", "cookie"];

/// Per-call facts collected up front so every exit path can record the
/// outcome consistently.
struct CallContext {
    provider: String,
    path: String,
    method: String,
    request_headers: String,
    request_body: String,
    client_ip: String,
    user_agent: String,
    start: Instant,
}

impl CallContext {
    /// Enqueue the outcome; `count_usage=false` for calls that never became
    /// a forwarded attempt.
    fn record(&self, state: &AppState, status: u16, error_message: &str, count_usage: bool) {
        state.recorder.record(RecordedCall {
            provider: self.provider.clone(),
            path: self.path.clone(),
            method: self.method.clone(),
            request_headers: self.request_headers.clone(),
            request_body: self.request_body.clone(),
            status,
            latency_ms: self.start.elapsed().as_millis() as u64,
            error_message: error_message.to_string(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
            completed_at: Utc::now(),
            count_usage,
        });
    }
}

/// Forward one inbound call to its provider
pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();

    let Some((provider_name, upstream_path)) = split_provider_path(&path) else {
        return AppError::NotFound(path).into_response();
    };

    let mut ctx = CallContext {
        provider: provider_name.to_string(),
        path: upstream_path.clone(),
        method: method.to_string(),
        request_headers: headers_to_json(&headers),
        request_body: String::new(),
        client_ip: client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        start,
    };

    // Dispatch: the provider must exist and be active before anything is
    // read or sent.
    let provider = match state.registry.get(provider_name).await {
        Ok(Some(provider)) => provider,
        Ok(None) => {
            let err = AppError::UnknownProvider(provider_name.to_string());
            ctx.record(&state, err.status_code().as_u16(), &err.to_string(), false);
            return err.into_response();
        }
        Err(e) => {
            error!(provider = %provider_name, error = %e, "Provider lookup failed");
            return e.into_response();
        }
    };

    if !provider.active {
        let err = AppError::ProviderDisabled(provider.name.clone());
        ctx.record(&state, err.status_code().as_u16(), &err.to_string(), false);
        return err.into_response();
    }

    // Buffer the inbound body; the upstream gets it byte-for-byte.
    let body_bytes = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let err = AppError::InboundRead(e.to_string());
            ctx.record(&state, err.status_code().as_u16(), &err.to_string(), false);
            return err.into_response();
        }
    };
    ctx.request_body = String::from_utf8_lossy(&body_bytes).into_owned();

    let outbound = match transform::build_outbound(&provider, &upstream_path, &headers) {
        Ok(parts) => parts,
        Err(err) => {
            ctx.record(&state, err.status_code().as_u16(), &err.to_string(), false);
            return err.into_response();
        }
    };

    match state
        .forwarder
        .send(
            method,
            &outbound.url,
            outbound.headers,
            body_bytes,
            provider.timeout_seconds,
        )
        .await
    {
        Ok(upstream) => {
            let outcome = if is_success(upstream.status) {
                "success"
            } else {
                "error"
            };
            record_forward(&provider.name, outcome, start.elapsed().as_secs_f64());
            ctx.record(&state, upstream.status, "", true);

            info!(
                provider = %provider.name,
                path = %upstream_path,
                status = upstream.status,
                latency_ms = start.elapsed().as_millis() as u64,
                "Forwarded request"
            );
            relay_response(upstream)
        }
        Err(ForwardError::Build(detail)) => {
            let err = AppError::RequestBuild(detail);
            ctx.record(&state, err.status_code().as_u16(), &err.to_string(), false);
            err.into_response()
        }
        Err(ForwardError::Transport(detail)) => {
            record_forward(&provider.name, "upstream_error", start.elapsed().as_secs_f64());
            // Synthetic status 0: the attempt happened but produced no
            // response, and it still counts toward usage.
            ctx.record(&state, 0, &detail, true);
            AppError::Upstream(detail).into_response()
        }
    }
}

/// Mirror a buffered upstream response back to the caller
fn relay_response(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() =
        StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    *response.headers_mut() = filter_response_headers(&upstream.headers);
    response
}

/// Serialize inbound headers for the audit trail, with credentials redacted
fn headers_to_json(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for name in headers.keys() {
        if REDACTED_HEADERS.contains(&name.as_str()) {
            map.insert(name.to_string(), serde_json::Value::from("[redacted]"));
            continue;
        }
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let value = if values.len() == 1 {
            serde_json::Value::from(values[0])
        } else {
            serde_json::Value::from(values)
        };
        map.insert(name.to_string(), value);
    }
    serde_json::Value::Object(map).to_string()
}

/// Best available client address: proxy headers first, then the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let from_header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    from_header("x-forwarded-for")
        .or_else(|| from_header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.2"),
        );
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.9");
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_headers_to_json_redacts_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let json = headers_to_json(&headers);
        assert!(!json.contains("secret"));
        assert!(json.contains("[redacted]"));
        assert!(json.contains("application/json"));
    }
}
