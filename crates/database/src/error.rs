use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("The requested data was not found: {0}")]
    NotFound(String),

    /// The row changed since it was read. Callers re-read and retry.
    #[error("Strategy {strategy_id} is no longer at version {expected_version}")]
    Conflict {
        strategy_id: Uuid,
        expected_version: i64,
    },

    #[error("Strategy {0} already exists; the strategy history is append-only")]
    Duplicate(Uuid),

    #[error("Market {0} would end up with more than one active strategy")]
    ActiveConflict(String),

    #[error("Lifecycle writes of status changes need an audit record")]
    MissingAudit,

    #[error("Invalid record: {0}")]
    Invalid(#[from] core_types::CoreError),

    #[error("Invalid policy update: {0}")]
    Policy(#[from] configuration::ConfigError),
}

impl StoreError {
    /// Optimistic-concurrency failures that a re-read may resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::ActiveConflict(_))
    }
}

/// Failure of an external data fetch. Only transient failures are retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Transient source failure: {0}")]
    Transient(String),

    #[error("Permanent source failure: {0}")]
    Permanent(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

impl From<StoreError> for SourceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Sqlx(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
                SourceError::Transient(error.to_string())
            }
            other => SourceError::Permanent(other.to_string()),
        }
    }
}
