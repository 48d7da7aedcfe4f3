//! Provider configuration endpoints

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    proxy::transform,
    registry::{ProviderRecord, TestStatus},
    usage::RecordedCall,
    AppState,
};

/// Common AI-API endpoint paths tried by the connectivity probe, most
/// specific first
const PROBE_PATHS: &[&str] = &[
    "/v1/chat/completions",
    "/v1/completions",
    "/chat/completions",
    "/completions",
    "/",
];

pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<ProviderRecord>>> {
    Ok(Json(state.registry.list().await?))
}

pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<ProviderRecord>> {
    state
        .registry
        .get(&name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("provider '{name}'")))
}

pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(mut record): Json<ProviderRecord>,
) -> AppResult<(StatusCode, Json<ProviderRecord>)> {
    if record.name.trim().is_empty() || record.base_url.trim().is_empty() {
        return Err(AppError::BadRequest(
            "provider name and base_url must be non-empty".to_string(),
        ));
    }

    let now = Utc::now();
    record.created_at = Some(now);
    record.updated_at = Some(now);

    state.registry.insert(record.clone()).await?;
    info!(provider = %record.name, "Created provider");
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(mut record): Json<ProviderRecord>,
) -> AppResult<Json<ProviderRecord>> {
    if record.base_url.trim().is_empty() {
        return Err(AppError::BadRequest("base_url must be non-empty".to_string()));
    }

    record.name = name.clone();
    record.updated_at = Some(Utc::now());

    state.registry.update(&name, record.clone()).await?;
    info!(provider = %name, "Updated provider");
    Ok(Json(record))
}

pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    state.registry.remove(&name).await?;
    info!(provider = %name, "Deleted provider");
    Ok(StatusCode::NO_CONTENT)
}

/// Connectivity probe request body
#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub name: String,
}

/// Connectivity probe outcome
#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub success: bool,
    /// Last observed upstream status; 0 when nothing answered
    pub status: u16,
    pub response_time_ms: u64,
    pub error: String,
    pub message: String,
}

/// Probe a provider by POSTing a small JSON body to common endpoint paths,
/// stopping at the first 2xx/3xx answer. The outcome lands in the audit log
/// and the usage ledger like any forwarded call, and is stamped onto the
/// provider record.
pub async fn test_provider(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestRequest>,
) -> AppResult<Json<TestResponse>> {
    let provider = state
        .registry
        .get(&request.name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("provider '{}'", request.name)))?;

    let probe_body = serde_json::json!({
        "test": "connectivity",
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string();

    let start = Instant::now();
    let mut succeeded = false;
    let mut last_status: u16 = 0;
    let mut last_error = String::new();
    let mut tested_path = "/";

    for &path in PROBE_PATHS {
        // The production transform supplies static headers and auth; the
        // probe only adds its own content type.
        let mut outbound = transform::build_outbound(&provider, path, &Default::default())?;
        outbound.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        tested_path = path;
        match state
            .forwarder
            .send(
                Method::POST,
                &outbound.url,
                outbound.headers,
                Bytes::from(probe_body.clone()),
                provider.timeout_seconds,
            )
            .await
        {
            Ok(response) if (200..400).contains(&response.status) => {
                last_status = response.status;
                last_error.clear();
                succeeded = true;
                break;
            }
            Ok(response) => {
                last_status = response.status;
                last_error.clear();
            }
            Err(e) => {
                last_error = match e {
                    crate::proxy::ForwardError::Build(detail)
                    | crate::proxy::ForwardError::Transport(detail) => detail,
                };
            }
        }
    }

    let response_time_ms = start.elapsed().as_millis() as u64;

    // Transport detail beats the canned explanation when nothing answered.
    let failure_detail = if succeeded {
        String::new()
    } else if last_status == 0 && !last_error.is_empty() {
        last_error
    } else {
        probe_error_message(last_status)
    };

    state.recorder.record(RecordedCall {
        provider: provider.name.clone(),
        path: tested_path.to_string(),
        method: "POST".to_string(),
        request_headers: "{}".to_string(),
        request_body: probe_body,
        status: last_status,
        latency_ms: response_time_ms,
        error_message: failure_detail.clone(),
        client_ip: "admin".to_string(),
        user_agent: "junction-probe".to_string(),
        completed_at: Utc::now(),
        count_usage: true,
    });

    let test_status = if succeeded {
        TestStatus::Success
    } else {
        TestStatus::Fail
    };
    if let Err(e) = state
        .registry
        .set_test_status(&provider.name, test_status, Utc::now())
        .await
    {
        warn!(provider = %provider.name, error = %e, "Failed to persist probe status");
    }

    let (error, message) = if succeeded {
        (String::new(), format!("Probe succeeded at {tested_path}"))
    } else {
        (failure_detail, "Probe failed".to_string())
    };

    Ok(Json(TestResponse {
        success: succeeded,
        status: last_status,
        response_time_ms,
        error,
        message,
    }))
}

/// Human explanation for a failed probe, keyed on the last status seen
fn probe_error_message(last_status: u16) -> String {
    match last_status {
        0 => "provider unreachable; check the network path and base_url".to_string(),
        404 => "provider reachable but every probe path returned 404".to_string(),
        401 => "provider reachable but authentication failed".to_string(),
        403 => "provider reachable but permission was denied".to_string(),
        405 => "provider reachable but POST is not supported on the probe paths".to_string(),
        status => format!("provider answered with unexpected status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_messages() {
        assert!(probe_error_message(0).contains("unreachable"));
        assert!(probe_error_message(401).contains("authentication"));
        assert!(probe_error_message(502).contains("502"));
    }
}
