//! Store error types.

use thiserror::Error;

/// Errors raised while turning a persisted payload back into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing required field {0:?}")]
    MissingField(String),

    #[error("field {field:?} has the wrong type, expected {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("field {field:?} has invalid value {value:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl DecodeError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        DecodeError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the key (or no record of the kind at all).
    #[error("key not found in store")]
    KeyNotFound,

    /// Version stamp mismatch on an atomic operation.
    #[error("unable to complete atomic operation, key modified")]
    KeyModified,

    /// `copy_to` or a downcast was handed an object of another kind.
    #[error("object kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A stored payload could not be decoded.
    #[error("failed to decode object at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: DecodeError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::KeyModified)
    }
}

// redb reports each phase with its own error type; funnel them through redb::Error.
macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Database(e.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
