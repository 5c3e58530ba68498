//! HTTP API using Axum.
//!
//! Check listener:
//! - JSON checks (POST /v1/check)
//!
//! Envoy listener (optional):
//! - Envoy HTTP-mode checks (every request)
//!
//! Admin listener:
//! - Health checks (/healthz, /livez, /readyz)
//! - Metrics (/metrics)
//! - Runtime stats (/stats)

mod admin;
mod check;

pub use admin::{
    admin_router, health_handler, live_handler, metrics_handler, ready_handler, stats_handler,
    AdminContext, CheckStatsResponse, HealthResponse, StatsResponse,
};
pub use check::{
    check_request_from_parts, check_router, envoy_check_handler, envoy_response,
    envoy_router, json_check_handler, CheckReply, CheckState, RpcStatus, HEADERS_TO_REMOVE,
};
