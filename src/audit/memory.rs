//! In-memory audit log

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

use super::{AuditFilter, AuditLog, AuditRecord};

/// Process-lifetime audit log used when no Redis URL is configured and by
/// the test suite.
#[derive(Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> AppError {
        AppError::Storage("audit log lock poisoned".to_string())
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> AppResult<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        records.push(record);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> AppResult<Vec<AuditRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_poisoned())?;
        let mut matching: Vec<AuditRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn delete_range(&self, filter: &AuditFilter) -> AppResult<u64> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        let before = records.len();
        records.retain(|r| !filter.in_time_range(r));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record_at(minutes_ago: i64) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            provider_name: "openai".to_string(),
            request_path: "/v1/models".to_string(),
            request_method: "GET".to_string(),
            request_headers: "{}".to_string(),
            request_body: String::new(),
            response_status: 200,
            response_time_ms: 10,
            error_message: String::new(),
            client_ip: "10.0.0.1".to_string(),
            user_agent: "curl/8.0".to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_query_is_newest_first() {
        let log = InMemoryAuditLog::new();
        log.append(record_at(30)).await.unwrap();
        log.append(record_at(5)).await.unwrap();
        log.append(record_at(60)).await.unwrap();

        let records = log.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].created_at > records[1].created_at);
        assert!(records[1].created_at > records[2].created_at);
    }

    #[tokio::test]
    async fn test_delete_range_only_honors_time_bounds() {
        let log = InMemoryAuditLog::new();
        log.append(record_at(90)).await.unwrap();
        log.append(record_at(10)).await.unwrap();

        let filter = AuditFilter {
            // The provider clause is ignored on delete.
            provider: Some("someone-else".to_string()),
            start_time: Some(Utc::now() - Duration::minutes(30)),
            ..Default::default()
        };
        let removed = log.delete_range(&filter).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = log.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
