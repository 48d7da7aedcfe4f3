//! Redis provider registry
//!
//! Records are stored as JSON values in a single hash keyed by provider name,
//! so lookup on the forwarding path is one `HGET`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

use crate::error::{AppError, AppResult};

use super::{ProviderRecord, ProviderRegistry, TestStatus};

/// Hash holding all provider records
const PROVIDERS_KEY: &str = "junction:providers";

/// Redis-backed registry
pub struct RedisRegistry {
    conn: redis::aio::ConnectionManager,
}

impl RedisRegistry {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProviderRegistry for RedisRegistry {
    async fn get(&self, name: &str) -> AppResult<Option<ProviderRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(PROVIDERS_KEY, name).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> AppResult<Vec<ProviderRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(PROVIDERS_KEY).await?;

        let mut records = Vec::with_capacity(raw.len());
        for json in raw {
            records.push(serde_json::from_str(&json)?);
        }
        records.sort_by(|a: &ProviderRecord, b: &ProviderRecord| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn insert(&self, record: ProviderRecord) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&record)?;

        // HSETNX makes create-if-absent atomic across concurrent admins.
        let created: bool = conn.hset_nx(PROVIDERS_KEY, &record.name, json).await?;
        if !created {
            return Err(AppError::Conflict(format!("provider '{}'", record.name)));
        }
        Ok(())
    }

    async fn update(&self, name: &str, mut record: ProviderRecord) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.hexists(PROVIDERS_KEY, name).await?;
        if !exists {
            return Err(AppError::NotFound(format!("provider '{name}'")));
        }

        record.name = name.to_string();
        let json = serde_json::to_string(&record)?;
        let _: () = conn.hset(PROVIDERS_KEY, name, json).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.hdel(PROVIDERS_KEY, name).await?;
        if removed == 0 {
            return Err(AppError::NotFound(format!("provider '{name}'")));
        }
        Ok(())
    }

    async fn active_count(&self) -> AppResult<usize> {
        Ok(self.list().await?.iter().filter(|r| r.active).count())
    }

    async fn set_test_status(
        &self,
        name: &str,
        status: TestStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut record = self
            .get(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("provider '{name}'")))?;
        record.last_test_status = status;
        record.last_test_time = Some(at);
        self.update(name, record).await
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
