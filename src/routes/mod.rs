//! HTTP routes for Junction
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod admin;
pub mod forward;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{middleware::auth::admin_auth, AppState};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Operator endpoints, all behind the admin bearer token
    let admin_routes = Router::new()
        .route(
            "/api-config",
            get(admin::providers::list_providers).post(admin::providers::create_provider),
        )
        .route("/api-config/test", post(admin::providers::test_provider))
        .route(
            "/api-config/:name",
            get(admin::providers::get_provider)
                .put(admin::providers::update_provider)
                .delete(admin::providers::delete_provider),
        )
        .route(
            "/logs",
            get(admin::logs::query_logs).delete(admin::logs::delete_logs),
        )
        .route("/logs/export", get(admin::logs::export_logs))
        .route("/stats", get(admin::stats::summary))
        .route("/stats/daily", get(admin::stats::daily))
        .route("/stats/realtime", get(admin::stats::realtime))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    // Public routes (health checks, metrics) - no auth required
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    // Everything else is a proxy candidate: the first path segment names the
    // provider. Registered routes shadow providers with the same name.
    Router::new()
        .merge(public_routes)
        .nest("/admin", admin_routes)
        .fallback(forward::forward_handler)
        // A panicking handler answers 500 instead of tearing down the server
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
