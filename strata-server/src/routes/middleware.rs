//! Request tracking and the panic boundary.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use strata_common::Error;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;
use crate::lifecycle::Lifecycle;
use crate::metrics::{
    MetricsRecorder, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS, PANICS_RECOVERED_TOTAL,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Holds one slot of the connection counter for the life of a request,
/// including when the handler panics or the client goes away.
struct InFlight(Arc<Lifecycle>);

impl InFlight {
    fn enter(lifecycle: Arc<Lifecycle>) -> Self {
        lifecycle.connections().increment();
        InFlight(lifecycle)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.connections().decrement();
    }
}

/// Count the request as in flight, tag it with a request id and record
/// request metrics.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let _in_flight = InFlight::enter(state.lifecycle.clone());

    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    state.recorder.increment_counter(HTTP_REQUESTS_TOTAL, 1);
    state
        .recorder
        .observe_histogram(HTTP_REQUEST_DURATION_SECONDS, started.elapsed().as_secs_f64());

    response
}

/// Turn a panic inside request handling into a structured 500.
pub fn handle_panic(recorder: &dyn MetricsRecorder, panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };

    recorder.increment_counter(PANICS_RECOVERED_TOTAL, 1);
    error!("Recovered panic while handling request: {}", detail);

    ApiError(Error::internal("internal server error")).into_response()
}
