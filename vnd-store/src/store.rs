//! Generic, type-erased object store.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::{DiskBackend, KvBackend, MemoryBackend};
use crate::error::{Result, StoreError};
use crate::key::{self, DEFAULT_ROOT_CHAIN};
use crate::object::{KvObject, downcast};

/// One record returned by [`ObjectStore::scan`].
#[derive(Debug)]
pub struct ScanEntry {
    pub key: String,
    /// The decoded record, or why it could not be decoded.
    pub object: Result<Box<dyn KvObject>>,
}

impl ScanEntry {
    /// Unwrap the decoded record as its concrete type.
    pub fn downcast<T: KvObject>(self, expected: &'static str) -> Result<T> {
        self.object.and_then(|obj| downcast(obj, expected))
    }
}

/// Persists any [`KvObject`] into a [`KvBackend`].
pub struct ObjectStore {
    backend: Arc<dyn KvBackend>,
    root: Vec<String>,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_root(backend, DEFAULT_ROOT_CHAIN)
    }

    pub fn with_root(backend: Arc<dyn KvBackend>, root: &[&str]) -> Self {
        Self {
            backend,
            root: root.iter().map(|part| part.to_string()).collect(),
        }
    }

    /// Store backed by a fresh in-memory map.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Store backed by the redb database in `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(DiskBackend::open(data_dir)?)))
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Full storage key for a list of key components.
    pub fn key_of<P: AsRef<str>>(&self, parts: &[P]) -> String {
        key::render(&self.root, parts)
    }

    /// Every stored record of `proto`'s kind, each with its own decode result.
    ///
    /// Fails with [`StoreError::KeyNotFound`] when the kind has no records.
    pub fn scan(&self, proto: &dyn KvObject) -> Result<Vec<ScanEntry>> {
        let prefix = self.key_of(&proto.key_prefix());
        let pairs = self.backend.list(&prefix)?;
        if pairs.is_empty() {
            trace!(prefix = %prefix, "No records under prefix");
            return Err(StoreError::KeyNotFound);
        }

        let mut entries = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.value.is_empty() {
                trace!(key = %pair.key, "Skipping entry with empty value");
                continue;
            }
            let mut obj = proto.new_object();
            let object = match obj.set_value(&pair.value) {
                Ok(()) => {
                    obj.set_index(pair.last_index);
                    Ok(obj)
                }
                Err(source) => Err(StoreError::Decode {
                    key: pair.key.clone(),
                    source,
                }),
            };
            entries.push(ScanEntry {
                key: pair.key,
                object,
            });
        }

        if entries.is_empty() {
            return Err(StoreError::KeyNotFound);
        }
        Ok(entries)
    }

    /// Every stored record of `proto`'s kind. A single undecodable record fails the call.
    pub fn list(&self, proto: &dyn KvObject) -> Result<Vec<Box<dyn KvObject>>> {
        self.scan(proto)?
            .into_iter()
            .map(|entry| entry.object)
            .collect()
    }

    /// [`ObjectStore::list`] for callers that know the concrete type.
    pub fn list_as<T: KvObject>(&self, proto: &T) -> Result<Vec<T>> {
        let kind = proto.kind();
        self.list(proto)?
            .into_iter()
            .map(|obj| downcast(obj, kind))
            .collect()
    }

    /// Load the record stored under `obj`'s key into `obj`.
    pub fn get_object(&self, obj: &mut dyn KvObject) -> Result<()> {
        let key = self.key_of(&obj.key());
        let pair = self.backend.get(&key)?.ok_or(StoreError::KeyNotFound)?;
        obj.set_value(&pair.value)
            .map_err(|source| StoreError::Decode { key, source })?;
        obj.set_index(pair.last_index);
        Ok(())
    }

    /// Create `obj`, or compare-and-swap it against its version stamp if it
    /// has been persisted before.
    pub fn put_object_atomic(&self, obj: &mut dyn KvObject) -> Result<()> {
        let previous = obj.exists().then(|| obj.index());
        self.put_with_previous(obj, previous)
    }

    /// Re-read the stored version stamp for `obj`'s key and write `obj` on top of it.
    pub fn put_object_rebased(&self, obj: &mut dyn KvObject) -> Result<()> {
        let key = self.key_of(&obj.key());
        let previous = self.backend.get(&key)?.map(|pair| pair.last_index);
        debug!(key = %key, previous = ?previous, "Rebasing object on stored version");
        self.put_with_previous(obj, previous)
    }

    fn put_with_previous(&self, obj: &mut dyn KvObject, previous: Option<u64>) -> Result<()> {
        if obj.skip() {
            return Ok(());
        }
        let key = self.key_of(&obj.key());
        let value = obj.value()?;
        let index = self.backend.atomic_put(&key, &value, previous)?;
        obj.set_index(index);
        trace!(key = %key, index, "Stored object");
        Ok(())
    }

    /// Remove `obj` regardless of its version stamp.
    pub fn delete_object(&self, obj: &dyn KvObject) -> Result<()> {
        if obj.skip() {
            return Ok(());
        }
        let key = self.key_of(&obj.key());
        self.backend.delete(&key)?;
        trace!(key = %key, "Deleted object");
        Ok(())
    }

    /// Remove `obj` only if the stored copy still carries `obj`'s version stamp.
    pub fn delete_object_atomic(&self, obj: &dyn KvObject) -> Result<()> {
        if obj.skip() {
            return Ok(());
        }
        let key = self.key_of(&obj.key());
        self.backend.atomic_delete(&key, obj.index())
    }
}
