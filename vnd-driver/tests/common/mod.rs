//! Helpers shared by the driver integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use vnd_driver::{Endpoint, MACVLAN, NetworkConfig};
use vnd_store::{KvBackend, KvPair, MemoryBackend, ObjectStore, Result, StoreError};

/// Memory backend with switchable failures.
pub struct FlakyBackend {
    inner: MemoryBackend,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_lists: AtomicBool,
    /// Number of upcoming puts that report a version conflict.
    pub conflicts: AtomicU32,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            conflicts: AtomicU32::new(0),
        }
    }
}

fn injected() -> StoreError {
    StoreError::Io(io::Error::other("injected failure"))
}

impl KvBackend for FlakyBackend {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.list(prefix)
    }

    fn get(&self, key: &str) -> Result<Option<KvPair>> {
        self.inner.get(key)
    }

    fn atomic_put(&self, key: &str, value: &[u8], previous: Option<u64>) -> Result<u64> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let conflict = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(StoreError::KeyModified);
        }
        self.inner.atomic_put(key, value, previous)
    }

    fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.delete(key)
    }

    fn atomic_delete(&self, key: &str, previous: u64) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.atomic_delete(key, previous)
    }
}

/// Store over a [`FlakyBackend`], plus the backend handle to flip failures.
pub fn flaky_store() -> (Arc<FlakyBackend>, Arc<ObjectStore>) {
    let backend = Arc::new(FlakyBackend::new());
    let store = Arc::new(ObjectStore::new(backend.clone()));
    (backend, store)
}

pub fn macvlan_network(id: &str, parent: &str) -> NetworkConfig {
    let mut network = NetworkConfig::new(&MACVLAN, id);
    network.parent = parent.to_string();
    network.mode = "bridge".to_string();
    network.mtu = 1500;
    network
}

pub fn macvlan_endpoint(id: &str, nid: &str, addr: &str) -> Endpoint {
    let mut endpoint = Endpoint::new(&MACVLAN, id, nid);
    endpoint.src_name = format!("macv{id}");
    endpoint.addr = Some(addr.parse().unwrap());
    endpoint
}
