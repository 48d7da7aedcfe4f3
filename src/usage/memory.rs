//! In-memory usage ledger
//!
//! Rows live in a `HashMap` behind a single `Mutex`, which serializes the
//! read-modify-write for every key. Holding the lock only spans the in-memory
//! update itself, never any I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, AppResult};

use super::{is_success, ledger_day, UsageLedger, UsageQuery, UsageRecord};

type LedgerKey = (NaiveDate, String);

/// In-memory ledger used when no Redis URL is configured and by the test
/// suite.
#[derive(Default)]
pub struct InMemoryLedger {
    rows: Mutex<HashMap<LedgerKey, UsageRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> AppError {
        AppError::Storage("usage ledger lock poisoned".to_string())
    }
}

#[async_trait]
impl UsageLedger for InMemoryLedger {
    async fn record(
        &self,
        provider: &str,
        at: DateTime<Utc>,
        status: u16,
        latency_ms: u64,
    ) -> AppResult<()> {
        let day = ledger_day(at);
        let success = is_success(status);

        let mut rows = self.rows.lock().map_err(|_| Self::lock_poisoned())?;
        match rows.get_mut(&(day, provider.to_string())) {
            Some(row) => {
                // Weight the running mean by the pre-increment total.
                let old_total = row.total_requests as f64;
                row.total_requests += 1;
                if success {
                    row.success_requests += 1;
                } else {
                    row.error_count += 1;
                }
                row.avg_latency_ms = (row.avg_latency_ms * old_total + latency_ms as f64)
                    / row.total_requests as f64;
            }
            None => {
                rows.insert(
                    (day, provider.to_string()),
                    UsageRecord {
                        date: day,
                        provider_name: provider.to_string(),
                        total_requests: 1,
                        success_requests: u64::from(success),
                        error_count: u64::from(!success),
                        avg_latency_ms: latency_ms as f64,
                    },
                );
            }
        }
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> AppResult<Vec<UsageRecord>> {
        let rows = self.rows.lock().map_err(|_| Self::lock_poisoned())?;
        let mut matching: Vec<UsageRecord> = rows
            .values()
            .filter(|row| query.matches(row.date, &row.provider_name))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (a.date, &a.provider_name).cmp(&(b.date, &b.provider_name)));
        Ok(matching)
    }
}
