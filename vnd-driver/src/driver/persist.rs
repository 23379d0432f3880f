//! Persistence of driver records, tolerant of a driver running without a store.

use tracing::{debug, warn};
use vnd_store::{KvObject, ObjectStore};

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};

/// Write `obj` to the store.
///
/// A record that has never been stored is created only if its key is free;
/// a taken key is reported as [`DriverError::RecordExists`]. A stored record
/// whose version stamp went stale is re-put on top of the stored stamp up to
/// `config.conflict_retries` times. The driver owns its records, so its copy
/// wins.
pub fn store_update(
    store: Option<&ObjectStore>,
    config: &DriverConfig,
    obj: &mut dyn KvObject,
) -> Result<()> {
    let Some(store) = store else {
        warn!(
            key = %obj.key().join("/"),
            kind = obj.kind(),
            "Store not initialized, object is not added to the store"
        );
        return Ok(());
    };

    let creating = !obj.exists();
    let mut attempt = 0;
    loop {
        let result = if attempt == 0 {
            store.put_object_atomic(obj)
        } else {
            store.put_object_rebased(obj)
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_conflict() && creating => {
                return Err(DriverError::RecordExists {
                    kind: obj.kind(),
                    key: store.key_of(&obj.key()),
                });
            }
            Err(e) if e.is_conflict() && attempt < config.conflict_retries => {
                attempt += 1;
                debug!(
                    key = %store.key_of(&obj.key()),
                    attempt,
                    "Version conflict on update, retrying"
                );
            }
            Err(e) => {
                return Err(DriverError::store(
                    "update",
                    obj.kind(),
                    store.key_of(&obj.key()),
                    e,
                ));
            }
        }
    }
}

/// Remove `obj` from the store. Removing an absent record succeeds.
///
/// A stored record is removed against its version stamp; if the stamp went
/// stale the stored copy is removed anyway.
pub fn store_delete(store: Option<&ObjectStore>, obj: &dyn KvObject) -> Result<()> {
    let Some(store) = store else {
        debug!(
            key = %obj.key().join("/"),
            kind = obj.kind(),
            "Store not initialized, object is not deleted from the store"
        );
        return Ok(());
    };

    let result = if obj.exists() {
        match store.delete_object_atomic(obj) {
            Err(e) if e.is_conflict() => {
                debug!(
                    key = %store.key_of(&obj.key()),
                    "Version conflict on delete, removing stored copy"
                );
                store.delete_object(obj)
            }
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    } else {
        store.delete_object(obj)
    };

    result.map_err(|e| DriverError::store("delete", obj.kind(), store.key_of(&obj.key()), e))
}
