use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{KvBackend, KvPair, check_previous};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct State {
    entries: BTreeMap<String, (u64, Vec<u8>)>,
    last_index: u64,
}

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvBackend for MemoryBackend {
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let state = self.state();
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (index, value))| KvPair {
                key: key.clone(),
                value: value.clone(),
                last_index: *index,
            })
            .collect())
    }

    fn get(&self, key: &str) -> Result<Option<KvPair>> {
        let state = self.state();
        Ok(state.entries.get(key).map(|(index, value)| KvPair {
            key: key.to_string(),
            value: value.clone(),
            last_index: *index,
        }))
    }

    fn atomic_put(&self, key: &str, value: &[u8], previous: Option<u64>) -> Result<u64> {
        let mut state = self.state();
        let current = state.entries.get(key).map(|(index, _)| *index);
        check_previous(current, previous)?;

        state.last_index += 1;
        let index = state.last_index;
        state
            .entries
            .insert(key.to_string(), (index, value.to_vec()));
        Ok(index)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.state().entries.remove(key);
        Ok(())
    }

    fn atomic_delete(&self, key: &str, previous: u64) -> Result<()> {
        let mut state = self.state();
        match state.entries.get(key).map(|(index, _)| *index) {
            None => Err(StoreError::KeyNotFound),
            Some(index) if index != previous => Err(StoreError::KeyModified),
            Some(_) => {
                state.entries.remove(key);
                Ok(())
            }
        }
    }
}
