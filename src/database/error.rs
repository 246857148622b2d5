use std::fmt;

use uuid::Uuid;

/// Errors surfaced by the storage layer.
#[derive(Debug)]
pub enum StoreError {
    /// The underlying query failed.
    Database(sqlx::Error),
    /// A stored document does not satisfy the model invariants.
    Malformed { id: Uuid, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::Malformed { id, reason } => {
                write!(f, "malformed document {id}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Malformed { .. } => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}
