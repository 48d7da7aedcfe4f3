//! Usage ledger
//!
//! Per-day, per-provider request counters. Every forwarded call lands here as
//! one observation; rows are created lazily on the first observation for a
//! `(day, provider)` pair and mutated in place afterwards.

pub mod memory;
pub mod recorder;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub use memory::InMemoryLedger;
pub use recorder::{RecordedCall, UsageRecorder};
pub use redis::RedisLedger;

/// One aggregated row of the ledger.
///
/// `success_requests + error_count == total_requests` holds at all times;
/// `avg_latency_ms` is the running mean over every observation for the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// UTC calendar day
    pub date: NaiveDate,
    pub provider_name: String,
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
}

/// Filter for ledger reads
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub provider: Option<String>,
    /// Inclusive first day
    pub start: Option<NaiveDate>,
    /// Inclusive last day
    pub end: Option<NaiveDate>,
}

impl UsageQuery {
    pub fn matches(&self, date: NaiveDate, provider: &str) -> bool {
        if let Some(name) = &self.provider {
            if name != provider {
                return false;
            }
        }
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if date > end {
                return false;
            }
        }
        true
    }
}

/// Success predicate shared by every backend: 2xx and 3xx count as success,
/// everything else (including the synthetic status 0 for transport failures)
/// as an error.
pub fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Truncate a timestamp to its ledger day. Days are UTC calendar days
/// everywhere; this is the only place the policy is encoded.
pub fn ledger_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Durable per-day/per-provider counters.
///
/// `record` must serialize its read-modify-write per `(day, provider)` key:
/// concurrent observations for the same key never lose an update.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Fold one observation into the row for `(ledger_day(at), provider)`
    async fn record(
        &self,
        provider: &str,
        at: DateTime<Utc>,
        status: u16,
        latency_ms: u64,
    ) -> AppResult<()>;

    /// Matching rows, ascending by day then provider name. Days with no
    /// observations yield no row.
    async fn query(&self, query: &UsageQuery) -> AppResult<Vec<UsageRecord>>;
}
