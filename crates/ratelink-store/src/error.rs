use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record id {0:?} cannot be used as a cache key")]
    InvalidId(String),

    #[error("cache entry {id} is malformed: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache entry {id} could not be read: {source}")]
    Unreadable {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not persist cache entry: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),
}
