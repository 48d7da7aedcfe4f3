//! End-to-end forwarding tests
//!
//! Each test runs the full router over in-memory stores against a wiremock
//! upstream, covering dispatch, auth rewriting, response relaying and the
//! recorded outcomes.

mod common;

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    bearer_provider, plain_provider, query_key_provider, NoAuthorizationHeader, TestHarness,
};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_forward_preserves_method_body_and_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-upstream"))
        .and(body_string(r#"{"model":"gpt-4o","stream":false}"#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "chatcmpl-1", "object": "chat.completion"}))
                .insert_header("x-upstream-trace", "abc"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    harness
        .add_provider(bearer_provider("openai", &upstream.uri(), "sk-upstream"))
        .await;

    let response = harness
        .server
        .post("/openai/v1/chat/completions")
        .add_header(HeaderName::from_static("authorization"), HeaderValue::try_from("Bearer caller-key").unwrap())
        .text(r#"{"model":"gpt-4o","stream":false}"#)
        .await;

    response.assert_status_ok();
    assert_eq!(response.header("x-upstream-trace"), "abc");
    response.assert_json(&json!({"id": "chatcmpl-1", "object": "chat.completion"}));

    let rows = harness.wait_for_usage(1, WAIT).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].provider_name, "openai");
    assert_eq!(rows[0].total_requests, 1);
    assert_eq!(rows[0].success_requests, 1);
    assert_eq!(rows[0].error_count, 0);

    let audit = harness.wait_for_audit(1, WAIT).await;
    assert_eq!(audit[0].provider_name, "openai");
    assert_eq!(audit[0].response_status, 200);
    assert_eq!(audit[0].request_path, "/v1/chat/completions");
    // Credentials never land in the audit trail.
    assert!(!audit[0].request_headers.contains("caller-key"));
}

#[tokio::test]
async fn test_unknown_provider_is_404_without_usage() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/ghost/v1/models").await;
    response.assert_status_not_found();

    // The rejection is audited; once it lands we know the queue drained and
    // the ledger silence is real.
    let audit = harness.wait_for_audit(1, WAIT).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].response_status, 404);
    assert!(!audit[0].error_message.is_empty());

    assert!(harness.usage_rows().await.is_empty());
}

#[tokio::test]
async fn test_inactive_provider_is_403_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    let mut record = plain_provider("disabled", &upstream.uri());
    record.active = false;
    harness.add_provider(record).await;

    let response = harness.server.post("/disabled/v1/chat/completions").await;
    response.assert_status(StatusCode::FORBIDDEN);

    let audit = harness.wait_for_audit(1, WAIT).await;
    assert_eq!(audit[0].response_status, 403);
    assert!(harness.usage_rows().await.is_empty());
}

#[tokio::test]
async fn test_upstream_http_error_is_relayed_and_counted_as_error() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    harness
        .add_provider(plain_provider("openai", &upstream.uri()))
        .await;

    let response = harness.server.get("/openai/v1/models").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    response.assert_text("upstream down");

    let rows = harness.wait_for_usage(1, WAIT).await;
    assert_eq!(rows[0].total_requests, 1);
    assert_eq!(rows[0].success_requests, 0);
    assert_eq!(rows[0].error_count, 1);

    // Relayed upstream failures are not transport errors: the audit record
    // keeps the real status and no error message.
    let audit = harness.wait_for_audit(1, WAIT).await;
    assert_eq!(audit[0].response_status, 503);
    assert!(audit[0].error_message.is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_502_and_recorded_with_status_zero() {
    let harness = TestHarness::new().await;
    // Port 1 on loopback refuses connections immediately.
    harness
        .add_provider(plain_provider("dead", "http://127.0.0.1:1"))
        .await;

    let response = harness.server.post("/dead/v1/chat/completions").await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let rows = harness.wait_for_usage(1, WAIT).await;
    assert_eq!(rows[0].total_requests, 1);
    assert_eq!(rows[0].error_count, 1);

    let audit = harness.wait_for_audit(1, WAIT).await;
    assert_eq!(audit[0].response_status, 0);
    assert!(!audit[0].error_message.is_empty());
}

#[tokio::test]
async fn test_query_key_provider_moves_bearer_token_into_url() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro"))
        .and(query_param("key", "XYZ"))
        .and(NoAuthorizationHeader)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .expect(1)
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    harness
        .add_provider(query_key_provider("gemini", &upstream.uri()))
        .await;

    let response = harness
        .server
        .post("/gemini/v1beta/models/gemini-pro")
        .add_header(HeaderName::from_static("authorization"), HeaderValue::try_from("Bearer XYZ").unwrap())
        .text("{}")
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_bare_provider_path_forwards_to_root() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root"))
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    harness
        .add_provider(plain_provider("openai", &upstream.uri()))
        .await;

    let response = harness.server.get("/openai").await;
    response.assert_status_ok();
    response.assert_text("root");
}

#[tokio::test]
async fn test_concurrent_forwards_all_land_in_one_ledger_row() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&upstream)
        .await;

    let harness = TestHarness::new().await;
    harness
        .add_provider(plain_provider("openai", &upstream.uri()))
        .await;

    let requests = (0..20).map(|_| {
        let server = &harness.server;
        async move {
            server
                .post("/openai/v1/embeddings")
                .text(r#"{"input":"x"}"#)
                .await
        }
    });
    let responses = futures::future::join_all(requests).await;
    for response in &responses {
        response.assert_status_ok();
    }

    let rows = harness.wait_for_usage(20, WAIT).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_requests, 20);
    assert_eq!(rows[0].success_requests, 20);
    assert_eq!(rows[0].error_count, 0);
}
