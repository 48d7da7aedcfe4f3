//! Audit log endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    audit::{self, AuditFilter, AuditRecord},
    error::{AppError, AppResult},
    AppState,
};

/// Fixed page size for log listings
const PAGE_SIZE: usize = 10;

/// Query parameters shared by list, delete and export
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub provider: Option<String>,
    /// Substring match on the request path
    pub path: Option<String>,
    pub method: Option<String>,
    pub status: Option<u16>,
    pub has_error: Option<bool>,
    /// RFC 3339 or `Y-m-d H:M:S`
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// 1-based page
    pub page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsPage {
    pub logs: Vec<AuditRecord>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

/// Parse the handful of timestamp shapes dashboards send
fn parse_time_flexible(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}

fn to_filter(params: &LogsParams) -> AppResult<AuditFilter> {
    let parse_bound = |raw: &Option<String>, which: &str| -> AppResult<Option<DateTime<Utc>>> {
        match raw.as_deref().filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => parse_time_flexible(raw)
                .map(Some)
                .ok_or_else(|| AppError::BadRequest(format!("unparseable {which} '{raw}'"))),
        }
    };

    Ok(AuditFilter {
        provider: params.provider.clone().filter(|s| !s.is_empty()),
        path_contains: params.path.clone().filter(|s| !s.is_empty()),
        method: params.method.clone().filter(|s| !s.is_empty()),
        status: params.status,
        has_error: params.has_error,
        start_time: parse_bound(&params.start_time, "start_time")?,
        end_time: parse_bound(&params.end_time, "end_time")?,
    })
}

/// `GET /admin/logs` - newest-first page of matching records
pub async fn query_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> AppResult<Json<LogsPage>> {
    let filter = to_filter(&params)?;
    let records = state.audit.query(&filter).await?;

    let total = records.len();
    let page = params.page.unwrap_or(1).max(1);
    let pages = total.div_ceil(PAGE_SIZE);
    let logs: Vec<AuditRecord> = records
        .into_iter()
        .skip((page - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();

    Ok(Json(LogsPage {
        logs,
        total,
        page,
        size: PAGE_SIZE,
        pages,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub message: String,
    pub count: u64,
}

/// `DELETE /admin/logs` - purge records inside the time range
pub async fn delete_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> AppResult<Json<DeleteResult>> {
    let filter = to_filter(&params)?;
    let count = state.audit.delete_range(&filter).await?;

    Ok(Json(DeleteResult {
        message: "logs deleted".to_string(),
        count,
    }))
}

/// `GET /admin/logs/export` - matching records as CSV
pub async fn export_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> AppResult<Response> {
    let filter = to_filter(&params)?;
    let records = state.audit.query(&filter).await?;
    let csv = audit::to_csv(&records);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=request-logs.csv",
            ),
        ],
        csv,
    )
        .into_response())
}
