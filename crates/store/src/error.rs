use std::time::Duration;

use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record read by the transaction changed before it could commit.
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A single transaction attempt ran longer than allowed.
    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be mapped back into a record.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classifies an error as worth retrying the whole transaction for.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                // serialization_failure, deadlock_detected
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
