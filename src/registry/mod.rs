//! Provider registry
//!
//! Durable store of upstream provider records. The forwarding path only reads
//! from it; the admin API mutates it.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AppResult;

pub use memory::InMemoryRegistry;
pub use redis::RedisRegistry;

/// How the provider's own credential is attached to the outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// No credential injected
    #[default]
    None,
    /// `Authorization: Bearer <auth_value>`
    Bearer,
    /// `X-API-Key: <auth_value>`
    ApiKey,
    /// `Authorization: Basic <auth_value>` (value pre-encoded by the operator)
    Basic,
}

/// What happens to the caller's own `Authorization` header.
///
/// Some upstreams (Google's Gemini API is the canonical case) authenticate
/// via a `key` query parameter instead of a header; `QueryKey` moves the
/// caller's bearer token into the URL and drops the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthPolicy {
    /// Forward the caller's `Authorization` header unchanged
    #[default]
    Passthrough,
    /// Move the caller's bearer token into a `key=` query parameter
    QueryKey,
}

/// Outcome of the most recent connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Never,
    Success,
    Fail,
}

/// A configured upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Unique name; doubles as the first path segment on the proxy route
    #[serde(default)]
    pub name: String,
    /// Upstream base URL; a missing scheme defaults to https at forward time
    pub base_url: String,
    #[serde(default)]
    pub description: String,
    /// Static headers applied when the inbound request doesn't set them
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub auth_type: AuthScheme,
    #[serde(default)]
    pub auth_value: String,
    #[serde(default)]
    pub client_auth: ClientAuthPolicy,
    /// Upstream timeout; zero or negative falls back to the gateway default
    #[serde(default)]
    pub timeout_seconds: i64,
    /// Stored for operators; the gateway does not enforce it
    #[serde(default)]
    pub rate_limit: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub last_test_status: TestStatus,
    #[serde(default)]
    pub last_test_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl ProviderRecord {
    /// A minimal active record; everything else takes its default
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            description: String::new(),
            headers: HashMap::new(),
            auth_type: AuthScheme::None,
            auth_value: String::new(),
            client_auth: ClientAuthPolicy::Passthrough,
            timeout_seconds: 0,
            rate_limit: 0,
            active: true,
            last_test_status: TestStatus::Never,
            last_test_time: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Read/write interface to the provider store.
///
/// Constructor-injected wherever provider records are needed so tests can
/// substitute the in-memory backend.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Look up a single provider by name
    async fn get(&self, name: &str) -> AppResult<Option<ProviderRecord>>;

    /// All provider records, sorted by name
    async fn list(&self) -> AppResult<Vec<ProviderRecord>>;

    /// Insert a new record; `Conflict` if the name is taken
    async fn insert(&self, record: ProviderRecord) -> AppResult<()>;

    /// Replace an existing record; `NotFound` if absent
    async fn update(&self, name: &str, record: ProviderRecord) -> AppResult<()>;

    /// Delete a record; `NotFound` if absent. Usage rows keyed by the name
    /// are left untouched.
    async fn remove(&self, name: &str) -> AppResult<()>;

    /// Number of records with `active=true`
    async fn active_count(&self) -> AppResult<usize>;

    /// Stamp the outcome of a connectivity probe onto the record
    async fn set_test_status(
        &self,
        name: &str,
        status: TestStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Storage reachability check for health endpoints
    async fn ping(&self) -> AppResult<()>;
}
