use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use garde::Validate;
use uuid::Uuid;

/// Date-time layouts carrying an explicit numeric offset (`+00:00` or `+0000`).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Date-time layouts without an offset; these are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A committed telemetry observation
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: i64,
    pub device_id: String,
    pub idempotency_key: Uuid,
    pub event_timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<i32>,
    pub luminosity: Option<i32>,
    pub presence: Option<i32>,
    pub probability_of_life: Option<f64>,
}

/// A normalized reading that has not been committed yet.
///
/// `id` and `received_at` do not exist here: both are assigned when the
/// store commits the row.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct NewReading {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub idempotency_key: Uuid,
    #[garde(skip)]
    pub event_timestamp: DateTime<Utc>,
    #[garde(skip)]
    pub temperature_c: Option<f64>,
    #[garde(skip)]
    pub humidity_pct: Option<i32>,
    #[garde(skip)]
    pub luminosity: Option<i32>,
    #[garde(custom(validate_presence))]
    pub presence: Option<i32>,
    #[garde(skip)]
    pub probability_of_life: Option<f64>,
}

impl NewReading {
    /// Materialize the committed record once the store has assigned its identity
    pub fn into_reading(self, id: i64, received_at: DateTime<Utc>) -> Reading {
        Reading {
            id,
            device_id: self.device_id,
            idempotency_key: self.idempotency_key,
            event_timestamp: self.event_timestamp,
            received_at,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            luminosity: self.luminosity,
            presence: self.presence,
            probability_of_life: self.probability_of_life,
        }
    }
}

/// Repository input for a single insert; `received_at` is stamped by the writer
#[derive(Debug, Clone, PartialEq)]
pub struct InsertReadingRepoInput {
    pub reading: NewReading,
    pub received_at: DateTime<Utc>,
}

/// Result of an idempotent write.
///
/// `idempotent` is true when the key had already been committed and the
/// stored record is returned instead of a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub reading: Reading,
    pub idempotent: bool,
}

/// Storage collaborator for readings
///
/// Implementations must enforce uniqueness of `idempotency_key` atomically:
/// a second insert with a committed key fails with
/// `DomainError::ReadingAlreadyExists` and never overwrites the stored row.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Insert a reading in its own transaction and return the committed row
    async fn insert_reading(&self, input: InsertReadingRepoInput) -> DomainResult<Reading>;

    /// Look up a committed reading by its idempotency key
    async fn get_reading_by_idempotency_key(
        &self,
        idempotency_key: Uuid,
    ) -> DomainResult<Option<Reading>>;

    /// Most recent readings ordered by `event_timestamp` descending
    async fn list_recent_readings(&self, limit: i64) -> DomainResult<Vec<Reading>>;

    /// Check that the store is reachable
    async fn ping(&self) -> DomainResult<()>;
}

/// `presence` is binary when set
pub fn is_valid_presence(presence: Option<i32>) -> bool {
    matches!(presence, None | Some(0) | Some(1))
}

fn validate_presence(value: &Option<i32>, _context: &()) -> garde::Result {
    if is_valid_presence(*value) {
        Ok(())
    } else {
        Err(garde::Error::new("presence must be 0, 1 or null"))
    }
}

/// Parse an idempotency key; hyphenated, simple, braced and URN forms are accepted
pub fn parse_idempotency_key(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

/// Parse an ISO-8601 instant and normalize it to UTC.
///
/// A trailing `Z` and any numeric offset are honoured. Values without an
/// offset, including bare dates, are taken as UTC.
pub fn parse_event_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garde::validate_struct;
    use crate::domain::DomainError;

    fn new_reading(presence: Option<i32>) -> NewReading {
        NewReading {
            device_id: "esp32-lab-01".to_string(),
            idempotency_key: Uuid::new_v4(),
            event_timestamp: Utc::now(),
            temperature_c: Some(21.5),
            humidity_pct: Some(40),
            luminosity: None,
            presence,
            probability_of_life: None,
        }
    }

    #[test]
    fn test_presence_predicate() {
        assert!(is_valid_presence(None));
        assert!(is_valid_presence(Some(0)));
        assert!(is_valid_presence(Some(1)));
        assert!(!is_valid_presence(Some(2)));
        assert!(!is_valid_presence(Some(-1)));
    }

    #[test]
    fn test_new_reading_validation() {
        assert!(validate_struct(&new_reading(Some(1))).is_ok());
        assert!(validate_struct(&new_reading(None)).is_ok());

        let result = validate_struct(&new_reading(Some(7)));
        assert!(matches!(result, Err(DomainError::ValidationError(_))));

        let mut empty_device = new_reading(None);
        empty_device.device_id = String::new();
        let result = validate_struct(&empty_device);
        assert!(matches!(result, Err(DomainError::ValidationError(msg)) if msg.contains("device_id")));
    }

    #[test]
    fn test_parse_idempotency_key() {
        let key = parse_idempotency_key("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap();
        assert_eq!(key.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");

        // Uppercase and unhyphenated forms name the same key
        assert_eq!(
            parse_idempotency_key("3FA85F64-5717-4562-B3FC-2C963F66AFA6"),
            Some(key)
        );
        assert_eq!(
            parse_idempotency_key("3fa85f6457174562b3fc2c963f66afa6"),
            Some(key)
        );

        assert!(parse_idempotency_key("not-a-uuid").is_none());
        assert!(parse_idempotency_key("").is_none());
    }

    #[test]
    fn test_zulu_and_explicit_offset_are_the_same_instant() {
        let zulu = parse_event_timestamp("2024-01-01T00:00:00Z").unwrap();
        let offset = parse_event_timestamp("2024-01-01T00:00:00+00:00").unwrap();
        let compact = parse_event_timestamp("2024-01-01T00:00:00+0000").unwrap();
        assert_eq!(zulu, offset);
        assert_eq!(zulu, compact);
    }

    #[test]
    fn test_offsets_normalize_to_utc() {
        let shifted = parse_event_timestamp("2024-01-01T03:00:00+03:00").unwrap();
        let utc = parse_event_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(shifted, utc);

        let negative = parse_event_timestamp("2023-12-31T21:00:00.000-03:00").unwrap();
        assert_eq!(negative, utc);
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        let naive = parse_event_timestamp("2024-01-01T00:00:00").unwrap();
        let spaced = parse_event_timestamp("2024-01-01 00:00:00.250").unwrap();
        let date_only = parse_event_timestamp("2024-01-01").unwrap();
        let utc = parse_event_timestamp("2024-01-01T00:00:00Z").unwrap();

        assert_eq!(naive, utc);
        assert_eq!(date_only, utc);
        assert_eq!(spaced.timestamp_millis() - utc.timestamp_millis(), 250);
    }

    #[test]
    fn test_unparseable_timestamps() {
        assert!(parse_event_timestamp("yesterday").is_none());
        assert!(parse_event_timestamp("2024-13-01T00:00:00Z").is_none());
        assert!(parse_event_timestamp("").is_none());
    }

    #[test]
    fn test_into_reading_keeps_measurements() {
        let new = new_reading(Some(0));
        let received_at = Utc::now();
        let reading = new.clone().into_reading(42, received_at);

        assert_eq!(reading.id, 42);
        assert_eq!(reading.received_at, received_at);
        assert_eq!(reading.idempotency_key, new.idempotency_key);
        assert_eq!(reading.presence, Some(0));
        assert_eq!(reading.temperature_c, Some(21.5));
    }
}
