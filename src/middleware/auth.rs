//! Admin authentication middleware
//!
//! Every /admin endpoint requires the operator bearer token from the
//! configuration. The proxy route itself is unauthenticated; caller
//! credentials there belong to the upstream providers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::AppError, AppState};

/// Extract the Authorization header and return the bearer token
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Reject requests without the configured admin token
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = extract_bearer_token(auth_header).ok_or(AppError::InvalidToken)?;

    if token != state.config.admin_token {
        warn!(path = %request.uri().path(), "Rejected admin request with wrong token");
        return Err(AppError::InvalidToken);
    }

    Ok(next.run(request).await)
}
