use crate::domain::{normalize_payload, DomainResult, ReadingWriter, WriteOutcome};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shared normalize-and-write entry point for every ingress.
///
/// Transport adapters only decide how each outcome is reported:
/// the HTTP handler maps it to a status code, the MQTT handler logs and
/// drops anything that is not a success.
pub struct ReadingIngestionService {
    writer: Arc<ReadingWriter>,
}

impl ReadingIngestionService {
    pub fn new(writer: Arc<ReadingWriter>) -> Self {
        Self { writer }
    }

    #[instrument(skip(self, raw), fields(device_id = %device_id))]
    pub async fn ingest(
        &self,
        device_id: &str,
        raw: &Map<String, Value>,
    ) -> DomainResult<WriteOutcome> {
        let reading = normalize_payload(device_id, raw)?;

        debug!(
            idempotency_key = %reading.idempotency_key,
            event_timestamp = %reading.event_timestamp,
            "payload normalized"
        );

        self.writer.write(reading).await
    }
}
