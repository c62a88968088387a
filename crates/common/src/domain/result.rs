use crate::domain::RejectReason;
use thiserror::Error;
use uuid::Uuid;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Payload rejected: {0}")]
    PayloadRejected(#[from] RejectReason),

    #[error("Reading already exists for idempotency key: {0}")]
    ReadingAlreadyExists(Uuid),

    #[error("Idempotency conflict but record not found: {0}")]
    IdempotencyConflictNotFound(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
