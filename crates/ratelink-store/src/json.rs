//! Directory of `<id>.json` files, one per crawled record.
//!
//! The directory is listed once on open to build the ID index; after that,
//! presence checks never touch the filesystem. Writes land in a temporary
//! file first and are renamed into place, so a crash mid-write never leaves
//! a truncated entry that would count as "processed".

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ratelink_core::CachedRecord;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{CacheScan, ResultCache, StoreError, check_id, decode_entry};

const EXTENSION: &str = "json";

pub struct JsonDirCache {
    dir: PathBuf,
    index: BTreeSet<String>,
}

impl JsonDirCache {
    /// Open (creating if needed) the cache directory and index its entries.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let mut index = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                index.insert(stem.to_string());
            }
        }
        info!(dir = %dir.display(), count = index.len(), "opened json result cache");
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    fn load(&self, id: &str) -> Result<CachedRecord, StoreError> {
        let bytes = fs::read(self.path_for(id)).map_err(|source| StoreError::Unreadable {
            id: id.to_string(),
            source,
        })?;
        decode_entry(id, &bytes)
    }
}

impl ResultCache for JsonDirCache {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.index.contains(id))
    }

    fn write(&mut self, record: &CachedRecord) -> Result<(), StoreError> {
        check_id(&record.id)?;
        let body = serde_json::to_vec(record)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.persist(self.path_for(&record.id))?;
        self.index.insert(record.id.clone());
        debug!(id = %record.id, results = record.results.len(), "cached record");
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<CachedRecord>, StoreError> {
        if !self.index.contains(id) {
            return Ok(None);
        }
        self.load(id).map(Some)
    }

    fn read_all(&self) -> Result<CacheScan, StoreError> {
        let mut scan = CacheScan::default();
        for id in &self.index {
            match self.load(id) {
                Ok(record) => scan.records.push(record),
                Err(err) => scan.malformed.push(err),
            }
        }
        Ok(scan)
    }

    fn known_ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.index.iter().cloned().collect())
    }

    fn check_id(&self, id: &str) -> Result<(), StoreError> {
        check_id(id)
    }
}
