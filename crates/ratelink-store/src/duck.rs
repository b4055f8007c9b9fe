//! DuckDB-backed result cache.
//!
//! One row per record ID in `cached_records`, holding the full JSON body.
//! The primary key doubles as the processed-ID index.

use std::collections::HashSet;
use std::path::Path;

use duckdb::{Connection, params};
use ratelink_core::CachedRecord;
use tracing::{debug, info};

use crate::{CacheScan, ResultCache, StoreError, check_id, decode_entry};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cached_records (
    id VARCHAR PRIMARY KEY,
    body VARCHAR NOT NULL
)";

/// Result cache stored in a DuckDB database.
///
/// Use [`open`](Self::open) for an in-memory database and
/// [`open_persistent`](Self::open_persistent) for a file that survives
/// across runs.
pub struct DuckCache {
    conn: Connection,
}

impl DuckCache {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let cache = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), count = cache.count()?, "opened duckdb result cache");
        Ok(cache)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Number of cached records.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT count(*) FROM cached_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ResultCache for DuckCache {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM cached_records WHERE id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    fn write(&mut self, record: &CachedRecord) -> Result<(), StoreError> {
        check_id(&record.id)?;
        let body = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO cached_records (id, body) VALUES (?, ?)",
            params![record.id, body],
        )?;
        debug!(id = %record.id, results = record.results.len(), "cached record");
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Option<CachedRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM cached_records WHERE id = ?")?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => {
                let body: String = row.get(0)?;
                decode_entry(id, body.as_bytes()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn read_all(&self) -> Result<CacheScan, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM cached_records ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut scan = CacheScan::default();
        for row in rows {
            let (id, body) = row?;
            match decode_entry(&id, body.as_bytes()) {
                Ok(record) => scan.records.push(record),
                Err(err) => scan.malformed.push(err),
            }
        }
        Ok(scan)
    }

    fn known_ids(&self) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM cached_records")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn check_id(&self, id: &str) -> Result<(), StoreError> {
        check_id(id)
    }
}
