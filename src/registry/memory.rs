//! In-memory provider registry
//!
//! Process-lifetime backend used when no Redis URL is configured and by the
//! test suite.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

use super::{ProviderRecord, ProviderRegistry, TestStatus};

/// In-memory registry backed by a `HashMap` under a `RwLock`
#[derive(Default)]
pub struct InMemoryRegistry {
    records: RwLock<HashMap<String, ProviderRecord>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> AppError {
        AppError::Storage("provider registry lock poisoned".to_string())
    }
}

#[async_trait]
impl ProviderRegistry for InMemoryRegistry {
    async fn get(&self, name: &str) -> AppResult<Option<ProviderRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_poisoned())?;
        Ok(records.get(name).cloned())
    }

    async fn list(&self) -> AppResult<Vec<ProviderRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_poisoned())?;
        let mut all: Vec<ProviderRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn insert(&self, record: ProviderRecord) -> AppResult<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        if records.contains_key(&record.name) {
            return Err(AppError::Conflict(format!("provider '{}'", record.name)));
        }
        records.insert(record.name.clone(), record);
        Ok(())
    }

    async fn update(&self, name: &str, mut record: ProviderRecord) -> AppResult<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        if !records.contains_key(name) {
            return Err(AppError::NotFound(format!("provider '{name}'")));
        }
        record.name = name.to_string();
        records.insert(name.to_string(), record);
        Ok(())
    }

    async fn remove(&self, name: &str) -> AppResult<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        if records.remove(name).is_none() {
            return Err(AppError::NotFound(format!("provider '{name}'")));
        }
        Ok(())
    }

    async fn active_count(&self) -> AppResult<usize> {
        let records = self.records.read().map_err(|_| Self::lock_poisoned())?;
        Ok(records.values().filter(|r| r.active).count())
    }

    async fn set_test_status(
        &self,
        name: &str,
        status: TestStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_poisoned())?;
        let record = records
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("provider '{name}'")))?;
        record.last_test_status = status;
        record.last_test_time = Some(at);
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
