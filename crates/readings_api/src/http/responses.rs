use common::domain::{Reading, WriteOutcome};
use serde::{Deserialize, Serialize};

/// Acknowledgement for `POST /readings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ack: bool,
    pub id: i64,
    pub stored_at: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
}

impl From<&WriteOutcome> for AckResponse {
    fn from(outcome: &WriteOutcome) -> Self {
        Self {
            ack: true,
            id: outcome.reading.id,
            stored_at: outcome.reading.received_at.to_rfc3339(),
            idempotent: outcome.idempotent,
        }
    }
}

/// A stored reading, using the firmware's field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingResponse {
    pub id: i64,
    pub device_id: String,
    pub timestamp: String,
    #[serde(rename = "temperatura_c")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "umidade_pct")]
    pub humidity_pct: Option<i32>,
    #[serde(rename = "luminosidade")]
    pub luminosity: Option<i32>,
    #[serde(rename = "presenca")]
    pub presence: Option<i32>,
    #[serde(rename = "probabilidade_vida")]
    pub probability_of_life: Option<f64>,
    pub received_at: String,
}

impl From<Reading> for ReadingResponse {
    fn from(reading: Reading) -> Self {
        Self {
            id: reading.id,
            device_id: reading.device_id,
            timestamp: reading.event_timestamp.to_rfc3339(),
            temperature_c: reading.temperature_c,
            humidity_pct: reading.humidity_pct,
            luminosity: reading.luminosity,
            presence: reading.presence,
            probability_of_life: reading.probability_of_life,
            received_at: reading.received_at.to_rfc3339(),
        }
    }
}
