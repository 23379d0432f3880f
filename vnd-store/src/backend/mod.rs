//! Byte-level key-value backends.

mod disk;
mod memory;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

use crate::error::{Result, StoreError};

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    /// Version stamp assigned by the backend on the last write.
    pub last_index: u64,
}

/// Storage engine behind an [`ObjectStore`](crate::ObjectStore).
///
/// Every successful write draws a fresh index from a backend-wide, strictly
/// increasing counter.
pub trait KvBackend: Send + Sync {
    /// All entries whose key starts with `prefix`, sorted by key.
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>>;

    /// The entry stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<KvPair>>;

    /// Create or compare-and-swap `key`.
    ///
    /// With `previous == None` the key must not exist yet. With
    /// `Some(index)` the stored index must equal `index`. Returns the new index.
    fn atomic_put(&self, key: &str, value: &[u8], previous: Option<u64>) -> Result<u64>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Remove `key` only if its stored index equals `previous`.
    fn atomic_delete(&self, key: &str, previous: u64) -> Result<()>;
}

/// Shared compare-and-swap rule for backends.
pub(crate) fn check_previous(current: Option<u64>, previous: Option<u64>) -> Result<()> {
    match (current, previous) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(StoreError::KeyModified),
        (None, Some(_)) => Err(StoreError::KeyNotFound),
        (Some(current), Some(previous)) if current == previous => Ok(()),
        (Some(_), Some(_)) => Err(StoreError::KeyModified),
    }
}
