//! Driver error types.

use thiserror::Error;
use vnd_store::StoreError;

/// Errors returned by driver lifecycle operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver structurally refuses the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("network {0} not found")]
    NetworkNotFound(String),

    #[error("endpoint {endpoint_id} not found in network {network_id}")]
    EndpointNotFound {
        network_id: String,
        endpoint_id: String,
    },

    #[error("network {0} already exists")]
    NetworkExists(String),

    #[error("endpoint {endpoint_id} already exists in network {network_id}")]
    EndpointExists {
        network_id: String,
        endpoint_id: String,
    },

    #[error("network {network_id} is already using parent interface {parent}")]
    ParentInUse { parent: String, network_id: String },

    /// A create found the record's key already taken in the store.
    #[error("{kind} record {key} already exists in store")]
    RecordExists { kind: &'static str, key: String },

    /// A backend operation failed for one record.
    #[error("failed to {op} {kind} object {key}: {source}")]
    Store {
        op: &'static str,
        kind: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl DriverError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DriverError::InvalidParameter(msg.into())
    }

    pub fn store(op: &'static str, kind: &'static str, key: String, source: StoreError) -> Self {
        DriverError::Store {
            op,
            kind,
            key,
            source,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, DriverError::Forbidden(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriverError::NetworkNotFound(_) | DriverError::EndpointNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
