use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::{KvBackend, KvPair, check_previous};
use crate::error::{Result, StoreError};

/// key -> (last index, payload)
const TABLE_OBJECTS: TableDefinition<&str, (u64, &[u8])> = TableDefinition::new("objects");
const TABLE_META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const META_LAST_INDEX: &str = "last_index";

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "local-kv.redb";

/// Node-local durable backend on top of redb.
pub struct DiskBackend {
    db: Database,
}

impl DiskBackend {
    /// Open (or create) `<data_dir>/local-kv.redb`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join(DB_FILE);
        let db = Database::create(&db_path)?;

        let txn = db.begin_write()?;
        txn.open_table(TABLE_OBJECTS)?;
        txn.open_table(TABLE_META)?;
        txn.commit()?;

        debug!(path = %db_path.display(), "Opened local key-value store");
        Ok(Self { db })
    }
}

impl KvBackend for DiskBackend {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let txn = self.db.begin_read()?;
        let objects = txn.open_table(TABLE_OBJECTS)?;
        let mut pairs = Vec::new();

        for item in objects.range(prefix..)? {
            let (key, entry) = item?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let (index, value) = entry.value();
            pairs.push(KvPair {
                key: key.to_string(),
                value: value.to_vec(),
                last_index: index,
            });
        }

        Ok(pairs)
    }

    fn get(&self, key: &str) -> Result<Option<KvPair>> {
        let txn = self.db.begin_read()?;
        let objects = txn.open_table(TABLE_OBJECTS)?;
        let pair = objects.get(key)?.map(|entry| {
            let (index, value) = entry.value();
            KvPair {
                key: key.to_string(),
                value: value.to_vec(),
                last_index: index,
            }
        });
        Ok(pair)
    }

    fn atomic_put(&self, key: &str, value: &[u8], previous: Option<u64>) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let index = {
            let mut objects = txn.open_table(TABLE_OBJECTS)?;
            let mut meta = txn.open_table(TABLE_META)?;

            let current = objects.get(key)?.map(|entry| entry.value().0);
            check_previous(current, previous)?;

            let index = meta.get(META_LAST_INDEX)?.map(|v| v.value()).unwrap_or(0) + 1;
            objects.insert(key, (index, value))?;
            meta.insert(META_LAST_INDEX, index)?;
            index
        };
        txn.commit()?;
        Ok(index)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut objects = txn.open_table(TABLE_OBJECTS)?;
            objects.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn atomic_delete(&self, key: &str, previous: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut objects = txn.open_table(TABLE_OBJECTS)?;
            let current = objects.get(key)?.map(|entry| entry.value().0);
            match current {
                None => return Err(StoreError::KeyNotFound),
                Some(index) if index != previous => return Err(StoreError::KeyModified),
                Some(_) => {
                    objects.remove(key)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}
