use crate::domain::{
    DomainError, DomainResult, InsertReadingRepoInput, Reading, ReadingRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name of the unique constraint guarding idempotency keys
pub const IDEMPOTENCY_KEY_CONSTRAINT: &str = "uq_readings_idempotency_key";

const SCHEMA_SQL: &str = include_str!("../../migrations/001_create_readings.sql");

const READING_COLUMNS: &str = "id, device_id, idempotency_key, event_timestamp, received_at, \
     temperature_c, humidity_pct, luminosity, presence, probability_of_life";

fn reading_from_row(row: &Row) -> Result<Reading, tokio_postgres::Error> {
    Ok(Reading {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        event_timestamp: row.try_get("event_timestamp")?,
        received_at: row.try_get("received_at")?,
        temperature_c: row.try_get("temperature_c")?,
        humidity_pct: row.try_get("humidity_pct")?,
        luminosity: row.try_get("luminosity")?,
        presence: row.try_get("presence")?,
        probability_of_life: row.try_get("probability_of_life")?,
    })
}

/// Map an insert failure: only the idempotency unique constraint is a conflict
fn map_insert_error(e: tokio_postgres::Error, idempotency_key: Uuid) -> DomainError {
    if let Some(db_err) = e.as_db_error() {
        match db_err.code().code() {
            "23505" if db_err.constraint() == Some(IDEMPOTENCY_KEY_CONSTRAINT) => {
                return DomainError::ReadingAlreadyExists(idempotency_key);
            }
            "23514" => {
                return DomainError::ValidationError(db_err.message().to_string());
            }
            _ => {}
        }
    }
    DomainError::RepositoryError(e.into())
}

#[derive(Clone)]
pub struct PostgresReadingRepository {
    client: PostgresClient,
}

impl PostgresReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Create the readings table, its constraints and indexes if missing
    pub async fn bootstrap_schema(&self) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.batch_execute(SCHEMA_SQL)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        info!("readings schema ready");
        Ok(())
    }
}

#[async_trait]
impl ReadingRepository for PostgresReadingRepository {
    async fn insert_reading(&self, input: InsertReadingRepoInput) -> DomainResult<Reading> {
        let reading = &input.reading;
        debug!(
            device_id = %reading.device_id,
            idempotency_key = %reading.idempotency_key,
            "inserting reading"
        );

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let query = format!(
            "INSERT INTO readings (device_id, idempotency_key, event_timestamp, received_at, \
             temperature_c, humidity_pct, luminosity, presence, probability_of_life)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            READING_COLUMNS
        );

        let result = tx
            .query_one(
                &query,
                &[
                    &reading.device_id,
                    &reading.idempotency_key,
                    &reading.event_timestamp,
                    &input.received_at,
                    &reading.temperature_c,
                    &reading.humidity_pct,
                    &reading.luminosity,
                    &reading.presence,
                    &reading.probability_of_life,
                ],
            )
            .await;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "failed to roll back reading insert");
                }
                return Err(map_insert_error(e, reading.idempotency_key));
            }
        };

        let stored =
            reading_from_row(&row).map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| map_insert_error(e, reading.idempotency_key))?;

        info!(reading_id = stored.id, "reading stored");
        Ok(stored)
    }

    async fn get_reading_by_idempotency_key(
        &self,
        idempotency_key: Uuid,
    ) -> DomainResult<Option<Reading>> {
        debug!(idempotency_key = %idempotency_key, "getting reading by idempotency key");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM readings WHERE idempotency_key = $1",
                    READING_COLUMNS
                ),
                &[&idempotency_key],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref()
            .map(reading_from_row)
            .transpose()
            .map_err(|e| DomainError::RepositoryError(e.into()))
    }

    async fn list_recent_readings(&self, limit: i64) -> DomainResult<Vec<Reading>> {
        debug!(limit, "listing recent readings");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM readings ORDER BY event_timestamp DESC, id DESC LIMIT $1",
                    READING_COLUMNS
                ),
                &[&limit],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let readings = rows
            .iter()
            .map(reading_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(count = readings.len(), "listed recent readings");
        Ok(readings)
    }

    async fn ping(&self) -> DomainResult<()> {
        self.client.ping().await.map_err(DomainError::RepositoryError)
    }
}
