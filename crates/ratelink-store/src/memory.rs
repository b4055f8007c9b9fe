use std::collections::{BTreeMap, HashSet};

use ratelink_core::CachedRecord;

use crate::{CacheScan, ResultCache, StoreError};

/// Ephemeral cache for tests and dry runs. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: BTreeMap<String, CachedRecord>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(id))
    }

    fn write(&mut self, record: &CachedRecord) -> Result<(), StoreError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<CachedRecord>, StoreError> {
        Ok(self.records.get(id).cloned())
    }

    fn read_all(&self) -> Result<CacheScan, StoreError> {
        Ok(CacheScan {
            records: self.records.values().cloned().collect(),
            malformed: Vec::new(),
        })
    }

    fn known_ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.records.keys().cloned().collect())
    }
}
