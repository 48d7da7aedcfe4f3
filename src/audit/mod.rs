//! Audit log
//!
//! Append-only record of every call the gateway handled, kept separately from
//! the aggregated usage ledger so individual requests stay inspectable.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

pub use memory::InMemoryAuditLog;
pub use redis::RedisAuditLog;

/// One handled call; immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub provider_name: String,
    pub request_path: String,
    pub request_method: String,
    /// Inbound headers as JSON
    pub request_headers: String,
    pub request_body: String,
    /// 0 when no upstream response was received
    pub response_status: u16,
    pub response_time_ms: u64,
    pub error_message: String,
    pub client_ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Filter for audit queries; all clauses are conjunctive
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Exact provider name
    pub provider: Option<String>,
    /// Substring of the request path
    pub path_contains: Option<String>,
    /// Exact method
    pub method: Option<String>,
    /// Exact response status
    pub status: Option<u16>,
    /// `true`: only records with an error message; `false`: only without
    pub has_error: Option<bool>,
    /// Inclusive creation-time bounds
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(provider) = &self.provider {
            if &record.provider_name != provider {
                return false;
            }
        }
        if let Some(fragment) = &self.path_contains {
            if !record.request_path.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if &record.request_method != method {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.response_status != status {
                return false;
            }
        }
        if let Some(has_error) = self.has_error {
            if record.error_message.is_empty() == has_error {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.created_at > end {
                return false;
            }
        }
        true
    }

    fn in_time_range(&self, record: &AuditRecord) -> bool {
        if let Some(start) = self.start_time {
            if record.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Append-only store of audit records
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record
    async fn append(&self, record: AuditRecord) -> AppResult<()>;

    /// Matching records, newest first
    async fn query(&self, filter: &AuditFilter) -> AppResult<Vec<AuditRecord>>;

    /// Delete records inside the filter's time range (other clauses are
    /// ignored, matching the administrative purge semantics). Returns the
    /// number removed.
    async fn delete_range(&self, filter: &AuditFilter) -> AppResult<u64>;
}

/// Render records as CSV for the export endpoint
pub fn to_csv(records: &[AuditRecord]) -> String {
    let mut csv = String::from(
        "time,provider,path,method,status,response_time_ms,error,client_ip\n",
    );
    for record in records {
        // The error message is free-form text; quote it so commas in
        // upstream errors don't shift columns.
        let error = record.error_message.replace('"', "'");
        csv.push_str(&format!(
            "{},{},{},{},{},{},\"{}\",{}\n",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.provider_name,
            record.request_path,
            record.request_method,
            record.response_status,
            record.response_time_ms,
            error,
            record.client_ip,
        ));
    }
    csv
}
