//! `DomainError` -> HTTP response, following the status-wrapper/`IntoResponse`
//! shape used by the pack's axum services (grounded on
//! `FlexNetOS-noa_ark_os/server/api/src/routes.rs`'s `ApiError`), with the
//! response body shape spec §7 mandates: `{success:false, errorMessage,
//! errors[]}`.

use af_core::{DomainError, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::AgentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            // NO_CAPACITY and TRANSPORT_FAILED never reach the HTTP boundary
            // as errors (spec §7: the job stays queued and the caller sees a
            // normal 201/202 response), but map them defensively rather than
            // panic if a future caller surfaces one directly.
            ErrorKind::NoCapacity | ErrorKind::TransportFailed => StatusCode::ACCEPTED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "success": false,
            "errorMessage": err.message,
            "errors": [err.kind().to_string()],
            "correlationId": err.correlation_id,
        }));
        (status, body).into_response()
    }
}
