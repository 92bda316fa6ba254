//! Error types for the persistence layer.

use thiserror::Error;

/// Errors returned by a [`CatalogStore`](super::CatalogStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Conflict: {entity} with key '{key}' already exists")]
    Conflict { entity: String, key: String },

    /// The row being updated does not exist
    #[error("Not found: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// Any other database failure
    #[error("Database error: {message}")]
    Database { message: String },

    /// A stored value could not be mapped onto its Rust type
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The connection mutex was poisoned
    #[error("Failed to acquire database lock: {message}")]
    Lock { message: String },
}

impl StoreError {
    /// Returns true if this error is a uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        StoreError::Decode {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                // Messages look like "UNIQUE constraint failed: instructors.full_name"
                let key = msg
                    .as_deref()
                    .and_then(|m| m.rsplit(": ").next())
                    .unwrap_or("unknown")
                    .to_string();
                let entity = key.split('.').next().unwrap_or("unknown").to_string();
                StoreError::Conflict { entity, key }
            }
            rusqlite::Error::FromSqlConversionFailure(_, _, inner) => StoreError::Decode {
                message: inner.to_string(),
            },
            _ => StoreError::Database {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode {
            message: err.to_string(),
        }
    }
}

/// Result alias for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;
