//! Request transformation
//!
//! Builds the outbound target URL and header set from the provider record
//! and the inbound request.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::registry::{AuthScheme, ClientAuthPolicy, ProviderRecord};

use super::headers::copy_request_headers;

/// Outbound request pieces ready for the forwarder
#[derive(Debug)]
pub struct OutboundParts {
    pub url: String,
    pub headers: HeaderMap,
}

/// Join the provider base URL and the upstream-relative path.
///
/// A trailing slash on the base is stripped, the path is appended as-is, and
/// a missing scheme defaults to https.
pub fn build_target_url(base_url: &str, upstream_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let url = format!("{base}{upstream_path}");
    if url.contains("://") {
        url
    } else {
        format!("https://{url}")
    }
}

/// Produce the outbound URL and headers for one inbound request.
///
/// Header layering, lowest to highest precedence: provider static headers,
/// inbound headers, provider auth. The `QueryKey` policy runs first because
/// it consumes the caller's `Authorization` header before anything can
/// overwrite it.
pub fn build_outbound(
    provider: &ProviderRecord,
    upstream_path: &str,
    inbound_headers: &HeaderMap,
) -> AppResult<OutboundParts> {
    let mut url = build_target_url(&provider.base_url, upstream_path);
    let mut headers = copy_request_headers(inbound_headers);

    if provider.client_auth == ClientAuthPolicy::QueryKey {
        move_bearer_to_query(&mut url, &mut headers);
    }

    apply_static_headers(&mut headers, provider);
    apply_provider_auth(&mut headers, provider)?;

    Ok(OutboundParts { url, headers })
}

/// Move the caller's bearer token into a `key=` query parameter and drop the
/// `Authorization` header so the credential isn't sent twice.
fn move_bearer_to_query(url: &mut String, headers: &mut HeaderMap) {
    let Some(value) = headers.remove(AUTHORIZATION) else {
        return;
    };
    let Ok(raw) = value.to_str() else {
        return;
    };

    // Accept both `Bearer <token>` and a bare token.
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        return;
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    url.push(separator);
    url.push_str("key=");
    url.push_str(token);
}

/// Apply provider static headers where the request didn't set them
fn apply_static_headers(headers: &mut HeaderMap, provider: &ProviderRecord) {
    for (name, value) in &provider.headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(provider = %provider.name, header = %name, "Skipping invalid static header name");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(value) else {
            warn!(provider = %provider.name, header = %name, "Skipping invalid static header value");
            continue;
        };
        if !headers.contains_key(&header_name) {
            headers.insert(header_name, header_value);
        }
    }
}

/// Overlay the provider's own credential; always wins over inbound headers
pub fn apply_provider_auth(headers: &mut HeaderMap, provider: &ProviderRecord) -> AppResult<()> {
    let invalid = |_| {
        AppError::RequestBuild(format!(
            "auth value for provider '{}' is not a valid header value",
            provider.name
        ))
    };

    match provider.auth_type {
        AuthScheme::None => {}
        AuthScheme::Bearer => {
            let value = HeaderValue::from_str(&format!("Bearer {}", provider.auth_value))
                .map_err(invalid)?;
            headers.insert(AUTHORIZATION, value);
        }
        AuthScheme::ApiKey => {
            let value = HeaderValue::from_str(&provider.auth_value).map_err(invalid)?;
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }
        AuthScheme::Basic => {
            let value = HeaderValue::from_str(&format!("Basic {}", provider.auth_value))
                .map_err(invalid)?;
            headers.insert(AUTHORIZATION, value);
        }
    }
    Ok(())
}
