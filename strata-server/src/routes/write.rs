//! Line protocol ingestion endpoint.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use strata_common::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::error::{ApiError, ErrorBody};
use crate::metrics::{
    PARSE_ERRORS_TOTAL, POINTS_WRITTEN_TOTAL, ROWS_WRITTEN_TOTAL, STORAGE_ERRORS_TOTAL,
    WRITE_DURATION_SECONDS, WRITE_REQUESTS_TOTAL,
};

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub points: usize,
    pub rows: usize,
}

/// POST /write - Parse a line protocol body and persist every point
pub async fn write_points(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<WriteResponse>, ApiError> {
    let started = Instant::now();
    state.recorder.increment_counter(WRITE_REQUESTS_TOTAL, 1);

    let result = match tokio::time::timeout(state.write_timeout, ingest(&state, body)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Write request exceeded {:?}", state.write_timeout);
            Err(Error::timeout("timed out handling write request")
                .with_context("write_timeout_ms", state.write_timeout.as_millis()))
        }
    };

    state
        .recorder
        .observe_histogram(WRITE_DURATION_SECONDS, started.elapsed().as_secs_f64());

    result.map(Json).map_err(ApiError)
}

/// Anything but POST on /write
pub async fn method_not_allowed(method: Method) -> Response {
    let status = StatusCode::METHOD_NOT_ALLOWED;
    let err = Error::validation(format!("method {} not allowed, use POST", method));

    (status, Json(ErrorBody::from_error(&err, status))).into_response()
}

async fn ingest(state: &AppState, body: Body) -> Result<WriteResponse, Error> {
    let read = axum::body::to_bytes(body, state.max_body_bytes);
    let bytes = match tokio::time::timeout(state.read_timeout, read).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            return Err(Error::validation(format!("failed to read request body: {}", e))
                .with_context("max_body_bytes", state.max_body_bytes)
                .with_source(e));
        }
        Err(_) => {
            return Err(Error::timeout("timed out reading request body")
                .with_context("read_timeout_ms", state.read_timeout.as_millis()));
        }
    };

    let text = std::str::from_utf8(&bytes)
        .map_err(|e| Error::validation("request body is not valid UTF-8").with_source(e))?;

    let points = strata_common::parse(text).map_err(|e| {
        state.recorder.increment_counter(PARSE_ERRORS_TOTAL, 1);
        Error::from(e)
    })?;

    let mut rows = 0;
    for (idx, point) in points.iter().enumerate() {
        if let Err(e) = state.storage.write_point(point).await {
            state.recorder.increment_counter(STORAGE_ERRORS_TOTAL, 1);
            state.recorder.increment_counter(POINTS_WRITTEN_TOTAL, idx as u64);
            state.recorder.increment_counter(ROWS_WRITTEN_TOTAL, rows as u64);

            return Err(Error::from(e)
                .with_context("points_written", idx)
                .with_context("points_total", points.len()));
        }
        rows += point.fields().len();
    }

    state
        .recorder
        .increment_counter(POINTS_WRITTEN_TOTAL, points.len() as u64);
    state.recorder.increment_counter(ROWS_WRITTEN_TOTAL, rows as u64);

    if points.is_empty() {
        debug!("Write request contained no points");
    } else {
        info!("Accepted {} points ({} rows)", points.len(), rows);
    }

    Ok(WriteResponse {
        points: points.len(),
        rows,
    })
}
