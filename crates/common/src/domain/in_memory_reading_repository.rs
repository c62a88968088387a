use crate::domain::{
    is_valid_presence, DomainError, DomainResult, InsertReadingRepoInput, Reading,
    ReadingRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct InMemoryState {
    next_id: i64,
    readings: Vec<Reading>,
    by_idempotency_key: HashMap<Uuid, usize>,
}

/// In-memory implementation of ReadingRepository.
///
/// Key uniqueness is checked and the row appended under a single write lock,
/// which gives the same atomicity the unique constraint gives in Postgres.
pub struct InMemoryReadingRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryReadingRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryState::default())),
        }
    }

    /// Number of stored readings
    pub async fn count(&self) -> usize {
        self.state.read().await.readings.len()
    }
}

impl Default for InMemoryReadingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryReadingRepository {
    async fn insert_reading(&self, input: InsertReadingRepoInput) -> DomainResult<Reading> {
        let key = input.reading.idempotency_key;

        if !is_valid_presence(input.reading.presence) {
            return Err(DomainError::ValidationError(
                "presence must be 0, 1 or null".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.by_idempotency_key.contains_key(&key) {
            return Err(DomainError::ReadingAlreadyExists(key));
        }

        state.next_id += 1;
        let reading = input.reading.into_reading(state.next_id, input.received_at);
        let index = state.readings.len();
        state.readings.push(reading.clone());
        state.by_idempotency_key.insert(key, index);

        Ok(reading)
    }

    async fn get_reading_by_idempotency_key(
        &self,
        idempotency_key: Uuid,
    ) -> DomainResult<Option<Reading>> {
        let state = self.state.read().await;
        Ok(state
            .by_idempotency_key
            .get(&idempotency_key)
            .map(|&index| state.readings[index].clone()))
    }

    async fn list_recent_readings(&self, limit: i64) -> DomainResult<Vec<Reading>> {
        let state = self.state.read().await;
        let mut readings = state.readings.clone();
        readings.sort_by(|a, b| {
            b.event_timestamp
                .cmp(&a.event_timestamp)
                .then(b.id.cmp(&a.id))
        });
        readings.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(readings)
    }

    async fn ping(&self) -> DomainResult<()> {
        Ok(())
    }
}
