//! Common test utilities for Junction
//!
//! Shared fixtures and helpers used across the integration tests: an
//! in-memory-backed application instance, provider builders, and polling
//! helpers for the asynchronous usage/audit writes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tokio::time::Instant;

use junction::audit::{AuditFilter, AuditLog, AuditRecord, InMemoryAuditLog};
use junction::config::Config;
use junction::registry::{
    AuthScheme, ClientAuthPolicy, InMemoryRegistry, ProviderRecord, ProviderRegistry,
};
use junction::routes;
use junction::usage::{InMemoryLedger, UsageLedger, UsageQuery, UsageRecord};
use junction::AppState;

/// Bearer token accepted on /admin endpoints in tests
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Configuration pointing at nothing external
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        redis_url: None,
        admin_token: TEST_ADMIN_TOKEN.to_string(),
        default_timeout_seconds: 5,
        providers_file: None,
    }
}

/// A full application instance over in-memory stores, plus direct handles to
/// those stores for seeding and assertions.
pub struct TestHarness {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub registry: Arc<InMemoryRegistry>,
    pub ledger: Arc<InMemoryLedger>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let registry = Arc::new(InMemoryRegistry::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let audit = Arc::new(InMemoryAuditLog::new());

        let state = Arc::new(AppState::with_stores(
            test_config(),
            reqwest::Client::new(),
            registry.clone(),
            ledger.clone(),
            audit.clone(),
        ));

        let server =
            TestServer::new(routes::create_router(state.clone())).expect("Failed to create test server");

        Self {
            server,
            state,
            registry,
            ledger,
            audit,
        }
    }

    pub async fn add_provider(&self, record: ProviderRecord) {
        self.registry
            .insert(record)
            .await
            .expect("Failed to seed provider");
    }

    /// Authorization header value for admin requests
    pub fn admin_bearer(&self) -> String {
        format!("Bearer {TEST_ADMIN_TOKEN}")
    }

    /// Poll the ledger until the summed totals reach `min_total` or the
    /// timeout elapses. Side writes go through a queue, so assertions on
    /// them wait instead of racing the worker.
    pub async fn wait_for_usage(&self, min_total: u64, timeout: Duration) -> Vec<UsageRecord> {
        let start = Instant::now();
        loop {
            let rows = self
                .ledger
                .query(&UsageQuery::default())
                .await
                .expect("ledger query failed");
            let total: u64 = rows.iter().map(|r| r.total_requests).sum();
            if total >= min_total {
                return rows;
            }
            if start.elapsed() > timeout {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll the audit log until `min_count` records exist or the timeout
    /// elapses.
    pub async fn wait_for_audit(&self, min_count: usize, timeout: Duration) -> Vec<AuditRecord> {
        let start = Instant::now();
        loop {
            let records = self
                .audit
                .query(&AuditFilter::default())
                .await
                .expect("audit query failed");
            if records.len() >= min_count {
                return records;
            }
            if start.elapsed() > timeout {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Every ledger row, without waiting
    pub async fn usage_rows(&self) -> Vec<UsageRecord> {
        self.ledger
            .query(&UsageQuery::default())
            .await
            .expect("ledger query failed")
    }
}

/// An active provider with no credential injection
pub fn plain_provider(name: &str, base_url: &str) -> ProviderRecord {
    ProviderRecord::new(name, base_url)
}

/// An active provider that injects a bearer token
pub fn bearer_provider(name: &str, base_url: &str, token: &str) -> ProviderRecord {
    let mut record = ProviderRecord::new(name, base_url);
    record.auth_type = AuthScheme::Bearer;
    record.auth_value = token.to_string();
    record
}

/// An active provider using query-parameter authentication
pub fn query_key_provider(name: &str, base_url: &str) -> ProviderRecord {
    let mut record = ProviderRecord::new(name, base_url);
    record.client_auth = ClientAuthPolicy::QueryKey;
    record
}

/// Matches requests that carry no `Authorization` header at all
pub struct NoAuthorizationHeader;

impl wiremock::Match for NoAuthorizationHeader {
    fn matches(&self, request: &wiremock::Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}
