
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::types::{ConfigDigest, KeyId};
use crate::vault::backend::SharePersistence;
use crate::vault::types::ShareRecord;

/// Process-local share store. Useful for simulations and tests; nothing
/// survives a restart.
#[derive(Default)]
pub struct MemoryShareStore {
    store: RwLock<HashMap<(ConfigDigest, KeyId), Vec<ShareRecord>>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of key pairs with a stored share set.
    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharePersistence for MemoryShareStore {
    async fn write_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
        records: &[ShareRecord],
    ) -> Result<(), PersistenceError> {
        let mut sorted = records.to_vec();
        sorted.sort_by_key(|r| r.dealer);

        let mut store = self
            .store
            .write()
            .map_err(|_| PersistenceError::Storage("share store lock poisoned".into()))?;
        store.insert((*config_digest, *key_id), sorted);
        Ok(())
    }

    async fn read_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
    ) -> Result<Vec<ShareRecord>, PersistenceError> {
        let store = self
            .store
            .read()
            .map_err(|_| PersistenceError::Storage("share store lock poisoned".into()))?;
        Ok(store.get(&(*config_digest, *key_id)).cloned().unwrap_or_default())
    }
}
