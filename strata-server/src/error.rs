//! Mapping of [`strata_common::Error`] onto HTTP responses.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use strata_common::{Error, ErrorKind};
use tracing::{error, warn};

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Canonical reason phrase of the status code
    pub error: String,

    #[serde(rename = "type")]
    pub kind: ErrorKind,

    pub code: u16,

    pub message: String,

    pub context: BTreeMap<String, String>,
}

/// Status code clients see for each kind of failure.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An [`Error`] on its way out through axum.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ErrorBody {
    pub(crate) fn from_error(err: &Error, status: StatusCode) -> Self {
        ErrorBody {
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            kind: err.kind(),
            code: status.as_u16(),
            message: err.message().to_string(),
            context: err.context().clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(err.kind());

        if status.is_server_error() {
            error!(kind = %err.kind(), "{}\n{}", err, err.backtrace());
        } else {
            warn!(kind = %err.kind(), "{}", err);
        }

        (status, Json(ErrorBody::from_error(&err, status))).into_response()
    }
}
