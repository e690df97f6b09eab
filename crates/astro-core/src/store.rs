//! Storage trait backing every cache.
//!
//! This module defines the [`EntryStore`] trait that provides a unified interface
//! over one durable keyed store, plus the [`StoredEntry`] record it holds.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use crate::error::Result;

/// One record of a keyed store.
///
/// Every cache shares this shape. The payload is kept as JSON text so that a
/// store never needs to know the domain type it is holding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    /// Deterministic identity of the logical query.
    pub key: String,
    /// Secondary index value (e.g. a subject id), if the cache uses one.
    pub partition: Option<String>,
    /// JSON-encoded payload.
    pub payload: String,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
    /// Payload format version.
    pub schema_version: u32,
    /// Completion flag for progressively written entries.
    pub complete: Option<bool>,
}

impl StoredEntry {
    /// Encodes `payload` into a new entry.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(
        key: impl Into<String>,
        payload: &T,
        timestamp: i64,
        schema_version: u32,
    ) -> Result<Self> {
        Ok(Self {
            key: key.into(),
            partition: None,
            payload: serde_json::to_string(payload)?,
            timestamp,
            schema_version,
            complete: None,
        })
    }

    /// Sets the secondary index value.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Sets the completion flag.
    #[must_use]
    pub const fn with_complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    /// Decodes the payload.
    ///
    /// # Errors
    /// Returns an error if the stored JSON does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Returns the age of the entry at `now_ms`, clamped at zero.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp).max(0)
    }

    /// Approximate storage footprint in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.payload.len() + self.partition.as_ref().map_or(0, String::len)
    }
}

/// A durable keyed store indexed by write time.
///
/// Implementations can persist to different backends (SQLite, in-memory, etc.).
/// Writes that hit a capacity ceiling must fail with
/// [`CacheError::QuotaExceeded`](crate::CacheError::QuotaExceeded) so the quota
/// recovery policy can recognize them.
#[async_trait]
pub trait EntryStore: Send + Sync + Debug {
    /// Returns the name of this store (e.g. "ephemeris").
    fn name(&self) -> &str;

    /// Retrieves the entry stored under `key`.
    ///
    /// Returns `Ok(Some(entry))` if present, `Ok(None)` if not.
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Inserts or replaces the entry under `entry.key`.
    async fn put(&self, entry: StoredEntry) -> Result<()>;

    /// Removes the entry under `key`.
    ///
    /// Returns `true` if an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every entry whose partition equals `partition`.
    ///
    /// Returns the number of entries removed.
    async fn delete_partition(&self, partition: &str) -> Result<usize>;

    /// Removes up to `limit` entries, oldest first by timestamp.
    ///
    /// Returns the number of entries removed.
    async fn evict_oldest(&self, limit: usize) -> Result<usize>;

    /// Removes every entry with `timestamp <= cutoff_ms` via the timestamp index.
    ///
    /// Returns the number of entries removed, or
    /// [`CacheError::MissingIndex`](crate::CacheError::MissingIndex) when the
    /// store predates the index.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    /// Returns the number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Returns true if the store holds no entries.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;
}
