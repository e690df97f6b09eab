//! SQLite-based store implementation.

use astro_core::{CacheError, EntryStore, Result, StoredEntry};
use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};

const TIMESTAMP_INDEX: &str = "idx_cache_entries_timestamp";

/// Options applied when a [`SqliteStore`] is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqliteOptions {
    /// Create the secondary index on the `partition` column.
    pub partition_index: bool,
    /// Page quota for the database; writes beyond it fail with `SQLITE_FULL`.
    pub max_page_count: Option<u32>,
}

impl SqliteOptions {
    /// Enables the partition index.
    #[must_use]
    pub const fn with_partition_index(mut self) -> Self {
        self.partition_index = true;
        self
    }

    /// Caps the database size in pages.
    #[must_use]
    pub const fn with_max_page_count(mut self, pages: u32) -> Self {
        self.max_page_count = Some(pages);
        self
    }
}

/// SQLite-backed keyed store.
///
/// Each store owns one database with a single `cache_entries` table, indexed by
/// `timestamp` for oldest-first enumeration. A write that runs into the page
/// quota surfaces as [`CacheError::QuotaExceeded`].
#[derive(Debug)]
pub struct SqliteStore {
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        options: SqliteOptions,
    ) -> Result<Self> {
        let name = name.into();
        let conn = Connection::open(path).map_err(|e| map_sqlite_error(&name, e))?;
        Self::with_connection(name, conn, options)
    }

    /// Create an in-memory store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory(name: impl Into<String>, options: SqliteOptions) -> Result<Self> {
        let name = name.into();
        let conn = Connection::open_in_memory().map_err(|e| map_sqlite_error(&name, e))?;
        Self::with_connection(name, conn, options)
    }

    fn with_connection(name: String, conn: Connection, options: SqliteOptions) -> Result<Self> {
        let store = Self {
            name,
            conn: Mutex::new(conn),
        };
        store.initialize_schema(options)?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self, options: SqliteOptions) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY NOT NULL,
                partition TEXT,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                schema_version INTEGER NOT NULL,
                complete INTEGER
            )",
            [],
        )
        .map_err(|e| map_sqlite_error(&self.name, e))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_timestamp
             ON cache_entries(timestamp)",
            [],
        )
        .map_err(|e| map_sqlite_error(&self.name, e))?;

        if options.partition_index {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
                 ON cache_entries(partition)",
                [],
            )
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        }

        if let Some(pages) = options.max_page_count {
            conn.pragma_update_and_check(None, "max_page_count", pages, |row| row.get::<_, i64>(0))
                .map_err(|e| map_sqlite_error(&self.name, e))?;
        }

        debug!(store = %self.name, "SQLite store schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))
    }

    /// Returns true if the timestamp index exists.
    ///
    /// Databases written before the index was introduced lack it.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be queried.
    pub fn has_timestamp_index(&self) -> Result<bool> {
        let conn = self.lock()?;
        Self::index_exists(&conn, &self.name)
    }

    fn index_exists(conn: &Connection, store: &str) -> Result<bool> {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
            params![TIMESTAMP_INDEX],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(|e| map_sqlite_error(store, e))
    }
}

/// Maps a rusqlite error, recognizing `SQLITE_FULL` as a quota failure.
fn map_sqlite_error(store: &str, err: rusqlite::Error) -> CacheError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::DiskFull => {
            CacheError::quota_exceeded(store, err.to_string())
        }
        _ => CacheError::Storage(err.to_string()),
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT key, partition, payload, timestamp, schema_version, complete
             FROM cache_entries WHERE key = ?1",
            params![key],
            |row| {
                Ok(StoredEntry {
                    key: row.get(0)?,
                    partition: row.get(1)?,
                    payload: row.get(2)?,
                    timestamp: row.get(3)?,
                    schema_version: row.get(4)?,
                    complete: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| map_sqlite_error(&self.name, e))
    }

    #[instrument(skip(self, entry), fields(store = %self.name, key = %entry.key, bytes = entry.payload.len()))]
    async fn put(&self, entry: StoredEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (key, partition, payload, timestamp, schema_version, complete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.key,
                entry.partition,
                entry.payload,
                entry.timestamp,
                entry.schema_version,
                entry.complete
            ],
        )
        .map_err(|e| map_sqlite_error(&self.name, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn delete_partition(&self, partition: &str) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE partition = ?1",
            params![partition],
        )
        .map_err(|e| map_sqlite_error(&self.name, e))
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn evict_oldest(&self, limit: usize) -> Result<usize> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries ORDER BY timestamp ASC LIMIT ?1
                )",
                params![limit],
            )
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        debug!("Evicted {} oldest entries", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.lock()?;
        if !Self::index_exists(&conn, &self.name)? {
            return Err(CacheError::MissingIndex(self.name.clone()));
        }
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries INDEXED BY idx_cache_entries_timestamp
                 WHERE timestamp <= ?1",
                params![cutoff_ms],
            )
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        if deleted > 0 {
            debug!("Deleted {} entries written at or before {}", deleted, cutoff_ms);
        }
        Ok(deleted)
    }

    async fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| map_sqlite_error(&self.name, e))?;
        debug!("Cleared all entries");
        Ok(())
    }
}
