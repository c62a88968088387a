use crate::domain::{
    DomainError, DomainResult, InsertReadingRepoInput, NewReading, ReadingRepository,
    WriteOutcome,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Persists readings at most once per idempotency key.
///
/// No in-process locking serializes writers: correctness relies on the
/// repository enforcing key uniqueness atomically. A losing writer resolves
/// the conflict by returning the stored record; it never retries the insert.
pub struct ReadingWriter {
    repository: Arc<dyn ReadingRepository>,
}

impl ReadingWriter {
    pub fn new(repository: Arc<dyn ReadingRepository>) -> Self {
        Self { repository }
    }

    #[instrument(
        skip_all,
        fields(
            device_id = %reading.device_id,
            idempotency_key = %reading.idempotency_key,
        )
    )]
    pub async fn write(&self, reading: NewReading) -> DomainResult<WriteOutcome> {
        crate::garde::validate_struct(&reading)?;

        let idempotency_key = reading.idempotency_key;
        let input = InsertReadingRepoInput {
            reading,
            received_at: Utc::now(),
        };

        match self.repository.insert_reading(input).await {
            Ok(reading) => {
                debug!(reading_id = reading.id, "reading committed");
                Ok(WriteOutcome {
                    reading,
                    idempotent: false,
                })
            }
            Err(DomainError::ReadingAlreadyExists(_)) => {
                debug!("idempotency key already committed, resolving existing reading");

                match self
                    .repository
                    .get_reading_by_idempotency_key(idempotency_key)
                    .await?
                {
                    Some(existing) => Ok(WriteOutcome {
                        reading: existing,
                        idempotent: true,
                    }),
                    None => {
                        warn!("idempotency conflict but no stored reading was found");
                        Err(DomainError::IdempotencyConflictNotFound(idempotency_key))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}
