//! Usage statistics endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{AppError, AppResult},
    usage::{ledger_day, UsageQuery, UsageRecord},
    AppState,
};

const DEFAULT_PAGE_SIZE: usize = 10;

/// Dashboard summary over a set of ledger rows
#[derive(Debug, Serialize, PartialEq)]
pub struct Summary {
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_requests: u64,
    /// Percent of total requests that succeeded
    pub success_rate: f64,
    /// Mean of the per-row average latencies, in milliseconds
    pub avg_response_time: f64,
}

fn summarize(rows: &[UsageRecord]) -> Summary {
    let total: u64 = rows.iter().map(|r| r.total_requests).sum();
    let success: u64 = rows.iter().map(|r| r.success_requests).sum();
    let errors: u64 = rows.iter().map(|r| r.error_count).sum();

    let avg_response_time = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|r| r.avg_latency_ms).sum::<f64>() / rows.len() as f64
    };
    let success_rate = if total > 0 {
        success as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Summary {
        total_requests: total,
        success_requests: success,
        error_requests: errors,
        success_rate,
        avg_response_time,
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    #[serde(flatten)]
    pub summary: Summary,
    pub active_apis: usize,
}

/// `GET /admin/stats` - whole-ledger dashboard numbers
pub async fn summary(State(state): State<Arc<AppState>>) -> AppResult<Json<DashboardSummary>> {
    let rows = state.ledger.query(&UsageQuery::default()).await?;

    // The provider count is decoration on the dashboard; a registry hiccup
    // shouldn't blank the statistics.
    let active_apis = match state.registry.active_count().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Failed to count active providers");
            0
        }
    };

    Ok(Json(DashboardSummary {
        summary: summarize(&rows),
        active_apis,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyParams {
    pub provider: Option<String>,
    /// Inclusive, `YYYY-MM-DD`
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DailyPage {
    pub summary: Summary,
    pub daily_stats: Vec<UsageRecord>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

fn parse_date(raw: &Option<String>, which: &str) -> AppResult<Option<NaiveDate>> {
    match raw.as_deref().filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("unparseable {which} '{raw}'"))),
    }
}

/// `GET /admin/stats/daily` - ledger rows ascending by day.
///
/// Without a date range every row is returned in one page; with one, results
/// are paginated.
pub async fn daily(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyParams>,
) -> AppResult<Json<DailyPage>> {
    let query = UsageQuery {
        provider: params.provider.clone().filter(|s| !s.is_empty()),
        start: parse_date(&params.start_date, "start_date")?,
        end: parse_date(&params.end_date, "end_date")?,
    };

    let rows = state.ledger.query(&query).await?;
    let total = rows.len();
    let selection_summary = summarize(&rows);

    let (page, size, pages, daily_stats) = if query.start.is_none() && query.end.is_none() {
        (1, total.max(1), 1, rows)
    } else {
        let size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let page = params.page.unwrap_or(1).max(1);
        let pages = total.div_ceil(size);
        let rows = rows
            .into_iter()
            .skip((page - 1) * size)
            .take(size)
            .collect();
        (page, size, pages, rows)
    };

    Ok(Json(DailyPage {
        summary: selection_summary,
        daily_stats,
        total,
        page,
        size,
        pages,
    }))
}

/// One provider's numbers for today
#[derive(Debug, Serialize)]
pub struct RealtimeRow {
    pub provider_name: String,
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_resp_time: f64,
}

/// `GET /admin/stats/realtime` - today's rows with derived rates
pub async fn realtime(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<RealtimeRow>>> {
    let today = ledger_day(Utc::now());
    let query = UsageQuery {
        provider: None,
        start: Some(today),
        end: Some(today),
    };

    let rows = state.ledger.query(&query).await?;
    let realtime = rows
        .into_iter()
        .map(|row| {
            let (success_rate, error_rate) = if row.total_requests > 0 {
                (
                    row.success_requests as f64 / row.total_requests as f64 * 100.0,
                    row.error_count as f64 / row.total_requests as f64 * 100.0,
                )
            } else {
                (0.0, 0.0)
            };
            RealtimeRow {
                provider_name: row.provider_name,
                total_requests: row.total_requests,
                success_count: row.success_requests,
                error_count: row.error_count,
                success_rate,
                error_rate,
                avg_resp_time: row.avg_latency_ms,
            }
        })
        .collect();

    Ok(Json(realtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(provider: &str, total: u64, success: u64, avg: f64) -> UsageRecord {
        UsageRecord {
            date: NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            provider_name: provider.to_string(),
            total_requests: total,
            success_requests: success,
            error_count: total - success,
            avg_latency_ms: avg,
        }
    }

    #[test]
    fn test_summarize_empty_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.avg_response_time, 0.0);
    }

    #[test]
    fn test_summarize_mixed_rows() {
        let rows = vec![row("openai", 8, 6, 100.0), row("gemini", 2, 2, 300.0)];
        let summary = summarize(&rows);

        assert_eq!(summary.total_requests, 10);
        assert_eq!(summary.success_requests, 8);
        assert_eq!(summary.error_requests, 2);
        assert_eq!(summary.success_rate, 80.0);
        // Mean of per-row averages, not a weighted mean.
        assert_eq!(summary.avg_response_time, 200.0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(&Some("2026-08-07".to_string()), "start_date").unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 7)
        );
        assert_eq!(parse_date(&None, "start_date").unwrap(), None);
        assert!(parse_date(&Some("08/07/2026".to_string()), "start_date").is_err());
    }
}
