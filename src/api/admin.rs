//! Admin API handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::AdminConfig;
use crate::service::AuthService;
use crate::telemetry::{render, AdminState, CheckStats};

/// Shared state of the admin listener.
pub struct AdminContext {
    pub state: Arc<AdminState>,
    pub service: Arc<AuthService>,
}

/// Build the admin router.
///
/// `/livez` and `/stats` are always served; `/healthz`, `/readyz` and
/// `/metrics` follow the admin configuration.
pub fn admin_router(config: &AdminConfig, context: Arc<AdminContext>) -> Router {
    let mut router = Router::new()
        .route("/livez", get(live_handler))
        .route("/stats", get(stats_handler));

    if config.health {
        router = router
            .route("/healthz", get(health_handler))
            .route("/readyz", get(ready_handler));
    }
    if config.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.with_state(context)
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler.
pub async fn health_handler(State(context): State<Arc<AdminContext>>) -> impl IntoResponse {
    let healthy = context.state.is_healthy();
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Stats response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub checks: CheckStatsResponse,
    pub chains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStatsResponse {
    pub active: u64,
    pub total: u64,
    pub allowed: u64,
    pub invalid_argument: u64,
    pub internal: u64,
    pub cleanup_runs: u64,
}

impl From<CheckStats> for CheckStatsResponse {
    fn from(stats: CheckStats) -> Self {
        Self {
            active: stats.active,
            total: stats.total,
            allowed: stats.allowed,
            invalid_argument: stats.invalid_argument,
            internal: stats.internal,
            cleanup_runs: stats.cleanup_runs,
        }
    }
}

/// Stats handler.
pub async fn stats_handler(State(context): State<Arc<AdminContext>>) -> impl IntoResponse {
    Json(StatsResponse {
        uptime_seconds: context.state.uptime_secs(),
        checks: context.state.check_stats().into(),
        chains: context
            .service
            .chain_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// Metrics handler (Prometheus format).
pub async fn metrics_handler() -> impl IntoResponse {
    match render() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Error encoding metrics: {}", e),
        ),
    }
}

/// Ready handler (for Kubernetes).
pub async fn ready_handler(State(context): State<Arc<AdminContext>>) -> impl IntoResponse {
    if context.state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Live handler (for Kubernetes).
pub async fn live_handler() -> impl IntoResponse {
    StatusCode::OK
}
