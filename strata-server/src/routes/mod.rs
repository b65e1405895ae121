//! HTTP route handlers.

pub mod health;
pub mod middleware;
pub mod write;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::lifecycle::Lifecycle;
use crate::metrics::{Metrics, MetricsRecorder};
use crate::storage::PointWriter;

pub use health::{health, ready, render_metrics};
pub use write::{method_not_allowed, write_points};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn PointWriter>,
    pub recorder: Arc<dyn MetricsRecorder>,
    pub metrics: Arc<Metrics>,
    pub lifecycle: Arc<Lifecycle>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_body_bytes: usize,
}

/// Build the router. Layers, outermost first: panic boundary, request
/// tracking, CORS, tracing. `/write` bounds its own handling time by
/// `write_timeout` so an expiry still gets a JSON error body.
pub fn router(state: AppState) -> Router {
    let recorder = state.recorder.clone();

    Router::new()
        // Health checks
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(render_metrics))
        // Ingestion
        .route("/write", post(write_points).fallback(method_not_allowed))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| {
                middleware::handle_panic(recorder.as_ref(), panic)
            },
        ))
        .with_state(state)
}
