//! Redis usage ledger
//!
//! Each `(day, provider)` row is a hash of monotonic counters plus a latency
//! sum; the average is derived on read. `HINCRBY`/`HINCRBYFLOAT` are atomic
//! on the server, so concurrent observations for the same key never lose an
//! update without any client-side locking.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use redis::AsyncCommands;

use crate::error::{AppError, AppResult};

use super::{is_success, ledger_day, UsageLedger, UsageQuery, UsageRecord};

/// Set of `<day>:<provider>` members naming every existing row
const INDEX_KEY: &str = "junction:usage:index";

const FIELD_TOTAL: &str = "total";
const FIELD_SUCCESS: &str = "success";
const FIELD_ERROR: &str = "error";
const FIELD_LATENCY_SUM: &str = "latency_sum_ms";

fn row_key(day: NaiveDate, provider: &str) -> String {
    format!("junction:usage:{day}:{provider}")
}

fn index_member(day: NaiveDate, provider: &str) -> String {
    format!("{day}:{provider}")
}

/// `YYYY-MM-DD` contains no colon, so the first colon separates day from
/// provider even when the provider name itself has colons.
fn parse_index_member(member: &str) -> Option<(NaiveDate, &str)> {
    let (day, provider) = member.split_once(':')?;
    let day = day.parse().ok()?;
    Some((day, provider))
}

/// Redis-backed ledger
pub struct RedisLedger {
    conn: redis::aio::ConnectionManager,
}

impl RedisLedger {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    async fn fetch_row(&self, day: NaiveDate, provider: String) -> AppResult<Option<UsageRecord>> {
        let mut conn = self.conn.clone();
        let fields: Vec<Option<String>> = conn
            .hget(
                row_key(day, &provider),
                &[FIELD_TOTAL, FIELD_SUCCESS, FIELD_ERROR, FIELD_LATENCY_SUM][..],
            )
            .await?;

        let parse_u64 = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<u64>().ok());
        let total = match fields.first().and_then(parse_u64) {
            Some(total) if total > 0 => total,
            // Row named in the index but the hash is gone (or empty): an
            // external purge removed it, so it no longer exists.
            _ => return Ok(None),
        };
        let success = fields.get(1).and_then(parse_u64).unwrap_or(0);
        let error = fields.get(2).and_then(parse_u64).unwrap_or(0);
        let latency_sum = fields
            .get(3)
            .and_then(|v| v.as_deref())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(Some(UsageRecord {
            date: day,
            provider_name: provider,
            total_requests: total,
            success_requests: success,
            error_count: error,
            avg_latency_ms: latency_sum / total as f64,
        }))
    }
}

#[async_trait]
impl UsageLedger for RedisLedger {
    async fn record(
        &self,
        provider: &str,
        at: DateTime<Utc>,
        status: u16,
        latency_ms: u64,
    ) -> AppResult<()> {
        let day = ledger_day(at);
        let key = row_key(day, provider);
        let counter = if is_success(status) {
            FIELD_SUCCESS
        } else {
            FIELD_ERROR
        };

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .sadd(INDEX_KEY, index_member(day, provider))
            .ignore()
            .hincr(&key, FIELD_TOTAL, 1)
            .ignore()
            .hincr(&key, counter, 1)
            .ignore()
            .cmd("HINCRBYFLOAT")
            .arg(&key)
            .arg(FIELD_LATENCY_SUM)
            .arg(latency_ms as f64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(AppError::Redis)?;
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> AppResult<Vec<UsageRecord>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(INDEX_KEY).await?;

        let mut keys: Vec<(NaiveDate, String)> = members
            .iter()
            .filter_map(|m| parse_index_member(m))
            .filter(|(day, provider)| query.matches(*day, provider))
            .map(|(day, provider)| (day, provider.to_string()))
            .collect();
        keys.sort();

        let fetches = keys
            .into_iter()
            .map(|(day, provider)| self.fetch_row(day, provider));
        let rows = try_join_all(fetches).await?;
        Ok(rows.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_shape() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        assert_eq!(row_key(day, "openai"), "junction:usage:2026-08-07:openai");
    }

    #[test]
    fn test_index_member_roundtrip() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let member = index_member(day, "openai");
        assert_eq!(parse_index_member(&member), Some((day, "openai")));

        // Colons in provider names survive the roundtrip.
        let member = index_member(day, "corp:internal");
        assert_eq!(parse_index_member(&member), Some((day, "corp:internal")));

        assert_eq!(parse_index_member("garbage"), None);
    }
}
