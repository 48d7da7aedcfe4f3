//! Upstream forwarder
//!
//! Executes the rewritten request: one attempt, per-provider timeout, body
//! buffered in full. Transport failures come back as a value, not an HTTP
//! response, so the caller can both answer 502 and record the outcome.

use std::time::Duration;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use tracing::{debug, error};

/// A buffered upstream response
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why the upstream call produced no response
#[derive(Debug)]
pub enum ForwardError {
    /// The request could not be constructed (bad URL, bad method)
    Build(String),
    /// Connect/timeout/TLS failure, or the response body broke mid-read
    Transport(String),
}

/// Thin wrapper around a pooled `reqwest::Client`
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, default_timeout_seconds: u64) -> Self {
        Self {
            client,
            default_timeout: Duration::from_secs(default_timeout_seconds.max(1)),
        }
    }

    /// Effective timeout for a provider-configured value
    fn timeout_for(&self, timeout_seconds: i64) -> Duration {
        if timeout_seconds > 0 {
            Duration::from_secs(timeout_seconds as u64)
        } else {
            self.default_timeout
        }
    }

    /// Send one request and buffer the whole response.
    ///
    /// No retries: the caller gets exactly what the single attempt produced.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout_seconds: i64,
    ) -> Result<UpstreamResponse, ForwardError> {
        let target = reqwest::Url::parse(url)
            .map_err(|e| ForwardError::Build(format!("invalid upstream URL '{url}': {e}")))?;

        let mut request = self
            .client
            .request(method.clone(), target)
            .headers(headers)
            .timeout(self.timeout_for(timeout_seconds));

        if !body.is_empty() {
            request = request.body(body);
        }

        debug!(method = %method, url = %url, "Sending upstream request");

        let response = request.send().await.map_err(|e| {
            error!(url = %url, error = %e, "Upstream request failed");
            if e.is_builder() {
                ForwardError::Build(e.to_string())
            } else {
                ForwardError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let body = response.bytes().await.map_err(|e| {
            error!(url = %url, error = %e, "Failed to read upstream response body");
            ForwardError::Transport(format!("failed to read upstream body: {e}"))
        })?;

        debug!(url = %url, status = status, body_len = body.len(), "Upstream response buffered");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarder() -> Forwarder {
        Forwarder::new(reqwest::Client::new(), 10)
    }

    #[test]
    fn test_timeout_falls_back_to_default() {
        let f = forwarder();
        assert_eq!(f.timeout_for(30), Duration::from_secs(30));
        assert_eq!(f.timeout_for(0), Duration::from_secs(10));
        assert_eq!(f.timeout_for(-5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_build_error() {
        let f = forwarder();
        let result = f
            .send(
                Method::GET,
                "https://",
                HeaderMap::new(),
                Bytes::new(),
                5,
            )
            .await;
        assert!(matches!(result, Err(ForwardError::Build(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let f = forwarder();
        // Port 1 on loopback refuses connections immediately.
        let result = f
            .send(
                Method::GET,
                "http://127.0.0.1:1/unreachable",
                HeaderMap::new(),
                Bytes::new(),
                2,
            )
            .await;
        assert!(matches!(result, Err(ForwardError::Transport(_))));
    }
}
