use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::DomainError;
use serde_json::json;
use tracing::error;

/// Request-path failure, rendered as `{"error": ...}`
#[derive(Debug)]
pub enum HttpError {
    MissingHeader(&'static str),
    InvalidIdempotencyKey,
    InvalidBody(String),
    Domain(DomainError),
}

impl From<DomainError> for HttpError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::MissingHeader(name) => bad_request(format!("missing header: {}", name)),
            HttpError::InvalidIdempotencyKey => {
                bad_request("Idempotency-Key must be a valid UUID".to_string())
            }
            HttpError::InvalidBody(reason) => bad_request(reason),
            HttpError::Domain(err) => domain_error_to_response(err),
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Map a domain error to its HTTP status and body
pub fn domain_error_to_response(error: DomainError) -> Response {
    match error {
        DomainError::PayloadRejected(reason) => bad_request(reason.to_string()),

        DomainError::ValidationError(msg) => bad_request(msg),

        DomainError::IdempotencyConflictNotFound(_) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "idempotency conflict but record not found" })),
        )
            .into_response(),

        // resolved by the writer, only reachable if a repository leaks it
        DomainError::ReadingAlreadyExists(key) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": format!("reading already exists for idempotency key {}", key) })),
        )
            .into_response(),

        DomainError::RepositoryError(err) => {
            let detail = format!("{:#}", err);
            error!(error = %detail, "repository failure while handling request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error", "detail": detail })),
            )
                .into_response()
        }
    }
}
