//! Converts loosely-typed payloads from either ingress into a [`NewReading`].
//!
//! Both the MQTT subscriber and the HTTP endpoint call [`normalize_payload`],
//! so a payload is accepted or rejected identically regardless of origin.

use crate::domain::{parse_event_timestamp, parse_idempotency_key, NewReading};
use serde_json::{Map, Value};
use thiserror::Error;

pub const IDEMPOTENCY_KEY_FIELD: &str = "idempotency_key";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A measurement field: the firmware name and its accepted English alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementField {
    pub wire: &'static str,
    pub alias: &'static str,
}

pub const TEMPERATURE_FIELD: MeasurementField = MeasurementField {
    wire: "temperatura_c",
    alias: "temperature_c",
};
pub const HUMIDITY_FIELD: MeasurementField = MeasurementField {
    wire: "umidade_pct",
    alias: "humidity_pct",
};
pub const LUMINOSITY_FIELD: MeasurementField = MeasurementField {
    wire: "luminosidade",
    alias: "luminosity",
};
pub const PRESENCE_FIELD: MeasurementField = MeasurementField {
    wire: "presenca",
    alias: "presence",
};
pub const PROBABILITY_OF_LIFE_FIELD: MeasurementField = MeasurementField {
    wire: "probabilidade_vida",
    alias: "probability_of_life",
};

impl MeasurementField {
    /// Firmware name wins when both spellings are present
    fn lookup<'a>(&self, raw: &'a Map<String, Value>) -> Option<&'a Value> {
        raw.get(self.wire).or_else(|| raw.get(self.alias))
    }
}

/// Why a payload could not become a reading.
///
/// Variants are checked in declaration order; the first failing check wins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("device id is required")]
    MissingDeviceId,

    #[error("idempotency_key must be a valid UUID")]
    InvalidIdempotencyKey,

    #[error("timestamp is required")]
    MissingTimestamp,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("presence must be 0, 1 or null, got {0}")]
    InvalidPresence(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Normalize a raw payload for `device_id` into a reading ready to be written.
///
/// Absent and `null` measurements stay `None`; nothing defaults to zero.
pub fn normalize_payload(
    device_id: &str,
    raw: &Map<String, Value>,
) -> Result<NewReading, RejectReason> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
        return Err(RejectReason::MissingDeviceId);
    }

    let idempotency_key = raw
        .get(IDEMPOTENCY_KEY_FIELD)
        .and_then(Value::as_str)
        .and_then(parse_idempotency_key)
        .ok_or(RejectReason::InvalidIdempotencyKey)?;

    let event_timestamp = match raw.get(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => return Err(RejectReason::MissingTimestamp),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(RejectReason::MissingTimestamp)
        }
        Some(Value::String(s)) => {
            parse_event_timestamp(s).ok_or_else(|| RejectReason::InvalidTimestamp(s.clone()))?
        }
        Some(other) => return Err(RejectReason::InvalidTimestamp(other.to_string())),
    };

    let presence = match PRESENCE_FIELD.lookup(raw) {
        None => None,
        Some(value) => match coerce_i32(PRESENCE_FIELD.wire, value) {
            Ok(None) => None,
            Ok(Some(p)) if p == 0 || p == 1 => Some(p),
            _ => return Err(RejectReason::InvalidPresence(value.to_string())),
        },
    };

    Ok(NewReading {
        device_id: device_id.to_string(),
        idempotency_key,
        event_timestamp,
        temperature_c: optional_f64(raw, TEMPERATURE_FIELD)?,
        humidity_pct: optional_i32(raw, HUMIDITY_FIELD)?,
        luminosity: optional_i32(raw, LUMINOSITY_FIELD)?,
        presence,
        probability_of_life: optional_f64(raw, PROBABILITY_OF_LIFE_FIELD)?,
    })
}

fn optional_f64(
    raw: &Map<String, Value>,
    field: MeasurementField,
) -> Result<Option<f64>, RejectReason> {
    field
        .lookup(raw)
        .map_or(Ok(None), |value| coerce_f64(field.wire, value))
}

fn optional_i32(
    raw: &Map<String, Value>,
    field: MeasurementField,
) -> Result<Option<i32>, RejectReason> {
    field
        .lookup(raw)
        .map_or(Ok(None), |value| coerce_i32(field.wire, value))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> RejectReason {
    RejectReason::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Integers, floats and numeric strings
fn coerce_f64(field: &'static str, value: &Value) -> Result<Option<f64>, RejectReason> {
    let number = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(invalid(field, format!("expected a number, got {}", value))),
    }
}

/// Integers, integral floats, integer strings and booleans
fn coerce_i32(field: &'static str, value: &Value) -> Result<Option<i32>, RejectReason> {
    let number = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    let number =
        number.ok_or_else(|| invalid(field, format!("expected an integer, got {}", value)))?;

    i32::try_from(number)
        .map(Some)
        .map_err(|_| invalid(field, format!("{} is out of range", number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const KEY: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_normalize_full_payload() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": 21.5,
            "umidade_pct": 40,
            "luminosidade": 812,
            "presenca": 1,
            "probabilidade_vida": 0.87
        }));

        let reading = normalize_payload("esp32-lab-01", &raw).unwrap();
        assert_eq!(reading.device_id, "esp32-lab-01");
        assert_eq!(reading.idempotency_key.to_string(), KEY);
        assert_eq!(
            reading.event_timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(reading.temperature_c, Some(21.5));
        assert_eq!(reading.humidity_pct, Some(40));
        assert_eq!(reading.luminosity, Some(812));
        assert_eq!(reading.presence, Some(1));
        assert_eq!(reading.probability_of_life, Some(0.87));
    }

    #[test]
    fn test_absent_and_null_fields_stay_none() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": null,
            "presenca": null
        }));

        let reading = normalize_payload("dev", &raw).unwrap();
        assert_eq!(reading.temperature_c, None);
        assert_eq!(reading.humidity_pct, None);
        assert_eq!(reading.luminosity, None);
        assert_eq!(reading.presence, None);
        assert_eq!(reading.probability_of_life, None);
    }

    #[test]
    fn test_float_fields_accept_integers_and_strings() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": 22,
            "probabilidade_vida": "0.5"
        }));

        let reading = normalize_payload("dev", &raw).unwrap();
        assert_eq!(reading.temperature_c, Some(22.0));
        assert_eq!(reading.probability_of_life, Some(0.5));
    }

    #[test]
    fn test_integer_fields_accept_integral_values() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "umidade_pct": 45.0,
            "luminosidade": "300",
            "presenca": true
        }));

        let reading = normalize_payload("dev", &raw).unwrap();
        assert_eq!(reading.humidity_pct, Some(45));
        assert_eq!(reading.luminosity, Some(300));
        assert_eq!(reading.presence, Some(1));
    }

    #[test]
    fn test_english_aliases_accepted() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature_c": 19.25,
            "humidity_pct": 50,
            "presence": 0
        }));

        let reading = normalize_payload("dev", &raw).unwrap();
        assert_eq!(reading.temperature_c, Some(19.25));
        assert_eq!(reading.humidity_pct, Some(50));
        assert_eq!(reading.presence, Some(0));
    }

    #[test]
    fn test_firmware_name_wins_over_alias() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": 10.0,
            "temperature_c": 99.0
        }));

        let reading = normalize_payload("dev", &raw).unwrap();
        assert_eq!(reading.temperature_c, Some(10.0));
    }

    #[test]
    fn test_missing_or_invalid_idempotency_key() {
        let missing = payload(json!({ "timestamp": "2024-01-01T00:00:00Z" }));
        assert_eq!(
            normalize_payload("dev", &missing),
            Err(RejectReason::InvalidIdempotencyKey)
        );

        let malformed = payload(json!({
            "idempotency_key": "abc",
            "timestamp": "2024-01-01T00:00:00Z"
        }));
        assert_eq!(
            normalize_payload("dev", &malformed),
            Err(RejectReason::InvalidIdempotencyKey)
        );

        let not_a_string = payload(json!({
            "idempotency_key": 12345,
            "timestamp": "2024-01-01T00:00:00Z"
        }));
        assert_eq!(
            normalize_payload("dev", &not_a_string),
            Err(RejectReason::InvalidIdempotencyKey)
        );
    }

    #[test]
    fn test_missing_timestamp() {
        for raw in [
            json!({ "idempotency_key": KEY }),
            json!({ "idempotency_key": KEY, "timestamp": null }),
            json!({ "idempotency_key": KEY, "timestamp": "  " }),
        ] {
            assert_eq!(
                normalize_payload("dev", &payload(raw)),
                Err(RejectReason::MissingTimestamp)
            );
        }
    }

    #[test]
    fn test_invalid_timestamp() {
        let raw = payload(json!({ "idempotency_key": KEY, "timestamp": "not a date" }));
        assert!(matches!(
            normalize_payload("dev", &raw),
            Err(RejectReason::InvalidTimestamp(_))
        ));

        let numeric = payload(json!({ "idempotency_key": KEY, "timestamp": 1704067200 }));
        assert!(matches!(
            normalize_payload("dev", &numeric),
            Err(RejectReason::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_invalid_presence() {
        for presence in [json!(2), json!(-1), json!(0.5), json!("yes")] {
            let raw = payload(json!({
                "idempotency_key": KEY,
                "timestamp": "2024-01-01T00:00:00Z",
                "presenca": presence
            }));
            assert!(matches!(
                normalize_payload("dev", &raw),
                Err(RejectReason::InvalidPresence(_))
            ));
        }
    }

    #[test]
    fn test_rejection_priority() {
        // Empty device id is reported before anything in the payload
        let raw = payload(json!({ "idempotency_key": "nope", "presenca": 9 }));
        assert_eq!(
            normalize_payload("   ", &raw),
            Err(RejectReason::MissingDeviceId)
        );

        // Bad key is reported before the missing timestamp and bad presence
        assert_eq!(
            normalize_payload("dev", &raw),
            Err(RejectReason::InvalidIdempotencyKey)
        );

        // Missing timestamp is reported before bad presence
        let raw = payload(json!({ "idempotency_key": KEY, "presenca": 9 }));
        assert_eq!(
            normalize_payload("dev", &raw),
            Err(RejectReason::MissingTimestamp)
        );
    }

    #[test]
    fn test_empty_device_id() {
        let raw = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z"
        }));
        assert_eq!(
            normalize_payload("   ", &raw),
            Err(RejectReason::MissingDeviceId)
        );
    }

    #[test]
    fn test_invalid_measurements() {
        let fractional = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "umidade_pct": 45.5
        }));
        assert!(matches!(
            normalize_payload("dev", &fractional),
            Err(RejectReason::InvalidField { field: "umidade_pct", .. })
        ));

        let text = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": "warm"
        }));
        assert!(matches!(
            normalize_payload("dev", &text),
            Err(RejectReason::InvalidField { field: "temperatura_c", .. })
        ));

        let not_finite = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperatura_c": "NaN"
        }));
        assert!(matches!(
            normalize_payload("dev", &not_finite),
            Err(RejectReason::InvalidField { .. })
        ));

        let overflow = payload(json!({
            "idempotency_key": KEY,
            "timestamp": "2024-01-01T00:00:00Z",
            "luminosidade": 10_000_000_000_i64
        }));
        assert!(matches!(
            normalize_payload("dev", &overflow),
            Err(RejectReason::InvalidField { field: "luminosidade", .. })
        ));
    }
}
