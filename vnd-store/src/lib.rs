//! vnd-store: persistence layer shared by all virtual network drivers.
//!
//! Drivers describe their records through the [`KvObject`] protocol and hand
//! them to an [`ObjectStore`], which never needs to know the concrete shape of
//! a record. Bytes end up in a [`KvBackend`]: either the in-memory map used by
//! tests and ephemeral setups, or the redb database used on a real node.
//!
//! # Example
//! ```ignore
//! use vnd_store::ObjectStore;
//!
//! let store = ObjectStore::open("/var/lib/vnd")?;
//! store.put_object_atomic(&mut record)?;
//! let all = store.list(&record)?;
//! ```

pub mod backend;
pub mod error;
pub mod key;
pub mod object;
pub mod store;

pub use backend::{DiskBackend, KvBackend, KvPair, MemoryBackend};
pub use error::{DecodeError, Result, StoreError};
pub use key::DEFAULT_ROOT_CHAIN;
pub use object::{AsAny, KvObject, assign, downcast, private_copy};
pub use store::{ObjectStore, ScanEntry};
