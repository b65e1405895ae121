//! Health, readiness and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;
use crate::lifecycle::ServerStatus;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub server_status: ServerStatus,
    pub server_status_code: u8,
    pub active_connections: usize,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
}

/// GET /health - Liveness, always 200 once the server is constructed
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.lifecycle.status();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        server_status: status,
        server_status_code: status.code(),
        active_connections: state.lifecycle.connections().active(),
        uptime_seconds: state.lifecycle.uptime().as_secs(),
    })
}

/// GET /ready - Readiness, 200 only while running with the health flag set
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready =
        state.lifecycle.is_healthy() && state.lifecycle.status() == ServerStatus::Running;

    if ready {
        (StatusCode::OK, Json(ReadyResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse { status: "not_ready" }),
        )
    }
}

/// GET /metrics - Prometheus text exposition
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        state.metrics.encode(),
    )
}
