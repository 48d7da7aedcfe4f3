//! Redis audit log
//!
//! Records are JSON values in a single list, `LPUSH`ed so `LRANGE 0 -1`
//! already reads newest first. The list is capped to keep a runaway upstream
//! from growing it without bound; the audit trail is best-effort by contract.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{AppError, AppResult};

use super::{AuditFilter, AuditLog, AuditRecord};

const AUDIT_KEY: &str = "junction:audit";

/// Oldest records beyond this count are discarded on append
const MAX_RECORDS: isize = 100_000;

/// Redis-backed audit log
pub struct RedisAuditLog {
    conn: redis::aio::ConnectionManager,
}

impl RedisAuditLog {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    async fn read_all(&self) -> AppResult<Vec<AuditRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(AUDIT_KEY, 0, -1).await?;

        let mut records = Vec::with_capacity(raw.len());
        for json in raw {
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditLog for RedisAuditLog {
    async fn append(&self, record: AuditRecord) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&record)?;

        redis::pipe()
            .atomic()
            .lpush(AUDIT_KEY, json)
            .ignore()
            .ltrim(AUDIT_KEY, 0, MAX_RECORDS - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(AppError::Redis)?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> AppResult<Vec<AuditRecord>> {
        let records = self.read_all().await?;
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn delete_range(&self, filter: &AuditFilter) -> AppResult<u64> {
        let records = self.read_all().await?;
        let (removed, kept): (Vec<AuditRecord>, Vec<AuditRecord>) = records
            .into_iter()
            .partition(|r| filter.in_time_range(r));

        if removed.is_empty() {
            return Ok(0);
        }

        // Rewrite the list with the survivors in their original order.
        // Appends racing this purge can be lost; acceptable for a
        // best-effort trail under an administrative purge.
        let mut pipe = redis::pipe();
        pipe.atomic().del(AUDIT_KEY).ignore();
        for record in &kept {
            pipe.rpush(AUDIT_KEY, serde_json::to_string(record)?).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(AppError::Redis)?;
        Ok(removed.len() as u64)
    }
}
