//! Result cache: one persisted [`CachedRecord`] per record ID.
//!
//! Presence of an entry is the "already processed" marker. Entries are
//! written once and never mutated, so every backend only needs presence
//! checks, whole-record writes, and scans.

use std::collections::HashSet;

use ratelink_core::CachedRecord;
use tracing::warn;

mod error;
mod json;
mod memory;
pub use error::StoreError;
pub use json::JsonDirCache;
pub use memory::MemoryCache;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckCache;

/// Everything a full scan of the cache found.
#[derive(Debug, Default)]
pub struct CacheScan {
    /// Readable entries, ordered by record ID.
    pub records: Vec<CachedRecord>,
    /// Entries that exist but could not be read or decoded.
    pub malformed: Vec<StoreError>,
}

/// Keyed persistence for crawl results.
pub trait ResultCache: Send {
    /// Whether a crawl for `id` has already been stored.
    fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Store `record` under `record.id`, replacing any previous entry.
    fn write(&mut self, record: &CachedRecord) -> Result<(), StoreError>;

    fn read(&self, id: &str) -> Result<Option<CachedRecord>, StoreError>;

    /// Read every entry. An unreadable or malformed entry is reported, not
    /// fatal.
    fn read_all(&self) -> Result<CacheScan, StoreError>;

    fn known_ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Whether `id` can be stored at all. Checked before any crawl work.
    fn check_id(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<C: ResultCache + ?Sized> ResultCache for Box<C> {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        (**self).exists(id)
    }

    fn write(&mut self, record: &CachedRecord) -> Result<(), StoreError> {
        (**self).write(record)
    }

    fn read(&self, id: &str) -> Result<Option<CachedRecord>, StoreError> {
        (**self).read(id)
    }

    fn read_all(&self) -> Result<CacheScan, StoreError> {
        (**self).read_all()
    }

    fn known_ids(&self) -> Result<HashSet<String>, StoreError> {
        (**self).known_ids()
    }

    fn check_id(&self, id: &str) -> Result<(), StoreError> {
        (**self).check_id(id)
    }
}

/// Reject IDs that cannot double as a file stem.
pub(crate) fn check_id(id: &str) -> Result<(), StoreError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.trim() != id;
    if bad {
        Err(StoreError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

/// Decode an entry stored under `key`. The key wins over the `id` in the
/// body, so decisions line up with [`ResultCache::known_ids`].
pub(crate) fn decode_entry(key: &str, body: &[u8]) -> Result<CachedRecord, StoreError> {
    let mut record: CachedRecord =
        serde_json::from_slice(body).map_err(|source| StoreError::Malformed {
            id: key.to_string(),
            source,
        })?;
    if record.id != key {
        warn!(key, body_id = %record.id, "cache entry id differs from its key; using the key");
        record.id = key.to_string();
    }
    Ok(record)
}
