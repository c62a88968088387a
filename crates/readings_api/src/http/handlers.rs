use crate::http::{AckResponse, HttpError, ReadingResponse};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::{
    parse_idempotency_key, ReadingIngestionService, ReadingRepository, IDEMPOTENCY_KEY_FIELD,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::num::IntErrorKind;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEVICE_ID_HEADER: &str = "X-Device-Id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

pub const SERVICE_NAME: &str = "robolab-ingest";

#[derive(Clone)]
pub struct ApiState {
    pub ingestion_service: Arc<ReadingIngestionService>,
    pub repository: Arc<dyn ReadingRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<String>,
}

/// Clamp a `limit` query value to `[1, MAX_LIMIT]`; anything non-integer yields the default
pub fn clamp_limit(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_LIMIT;
    };

    match raw.trim().parse::<i64>() {
        Ok(limit) => limit.clamp(1, MAX_LIMIT),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => MAX_LIMIT,
            IntErrorKind::NegOverflow => 1,
            _ => DEFAULT_LIMIT,
        },
    }
}

fn require_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, HttpError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(HttpError::MissingHeader(name))
}

/// An empty body is an empty object; anything else must be a JSON object
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(HttpError::InvalidBody(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(HttpError::InvalidBody(format!("invalid JSON body: {}", e))),
    }
}

pub(crate) async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "endpoints": ["/health", "/readings (GET, POST)", "/leituras (GET, POST)"],
    }))
}

#[instrument(skip_all)]
pub(crate) async fn health(State(state): State<ApiState>) -> Response {
    match state.repository.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "app": "ok", "db": "ok" }))).into_response(),
        Err(e) => {
            warn!(error = %e, "store health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "app": "ok", "db": "error", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[instrument(skip_all, fields(device_id, idempotency_key))]
pub(crate) async fn create_reading(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let device_id = require_header(&headers, DEVICE_ID_HEADER)?;
    let raw_key = require_header(&headers, IDEMPOTENCY_KEY_HEADER)?;
    let idempotency_key = parse_idempotency_key(raw_key).ok_or(HttpError::InvalidIdempotencyKey)?;

    tracing::Span::current()
        .record("device_id", device_id)
        .record("idempotency_key", tracing::field::display(idempotency_key));

    let mut raw = parse_body(&body)?;
    raw.insert(
        IDEMPOTENCY_KEY_FIELD.to_string(),
        Value::String(idempotency_key.to_string()),
    );

    let outcome = state.ingestion_service.ingest(device_id, &raw).await?;
    let status = if outcome.idempotent {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    debug!(reading_id = outcome.reading.id, idempotent = outcome.idempotent, "reading acknowledged");
    Ok((status, Json(AckResponse::from(&outcome))).into_response())
}

#[instrument(skip_all)]
pub(crate) async fn list_readings(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReadingResponse>>, HttpError> {
    let limit = clamp_limit(params.limit.as_deref());

    let readings = state.repository.list_recent_readings(limit).await?;
    Ok(Json(readings.into_iter().map(ReadingResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some("25")), 25);
        assert_eq!(clamp_limit(Some(" 7 ")), 7);
        assert_eq!(clamp_limit(Some("5000")), 1000);
        assert_eq!(clamp_limit(Some("0")), 1);
        assert_eq!(clamp_limit(Some("-3")), 1);
        assert_eq!(clamp_limit(Some("99999999999999999999999")), 1000);
        assert_eq!(clamp_limit(Some("ten")), 100);
        assert_eq!(clamp_limit(Some("2.5")), 100);
        assert_eq!(clamp_limit(Some("")), 100);
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(b"").unwrap().is_empty());
        assert!(parse_body(b"  \n").unwrap().is_empty());
        assert_eq!(
            parse_body(br#"{"timestamp":"2024-01-01T00:00:00Z"}"#)
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(parse_body(b"[]"), Err(HttpError::InvalidBody(_))));
        assert!(matches!(parse_body(b"{oops"), Err(HttpError::InvalidBody(_))));
    }

    #[test]
    fn test_require_header() {
        let mut headers = HeaderMap::new();
        headers.insert(DEVICE_ID_HEADER, "esp32-lab-01".parse().unwrap());
        headers.insert(IDEMPOTENCY_KEY_HEADER, "   ".parse().unwrap());

        assert_eq!(require_header(&headers, DEVICE_ID_HEADER).unwrap(), "esp32-lab-01");
        assert!(matches!(
            require_header(&headers, IDEMPOTENCY_KEY_HEADER),
            Err(HttpError::MissingHeader("Idempotency-Key"))
        ));
    }
}
