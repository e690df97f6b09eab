//! In-memory store implementation.

use astro_core::{CacheError, EntryStore, Result, StoredEntry};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Entries plus the `(timestamp, key)` index used for oldest-first walks.
#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, StoredEntry>,
    by_time: BTreeSet<(i64, String)>,
    bytes: usize,
}

impl MemoryState {
    fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        self.by_time.remove(&(entry.timestamp, entry.key.clone()));
        self.bytes -= entry.size_bytes();
        Some(entry)
    }

    fn insert(&mut self, entry: StoredEntry) {
        self.remove(&entry.key);
        self.bytes += entry.size_bytes();
        self.by_time.insert((entry.timestamp, entry.key.clone()));
        self.entries.insert(entry.key.clone(), entry);
    }
}

/// Simple in-memory store for tests and ephemeral sessions.
///
/// Data lives in a `RwLock`-protected map and is lost when the store is
/// dropped. An optional byte quota makes writes fail with
/// [`CacheError::QuotaExceeded`] once the stored payloads would exceed it.
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    state: RwLock<MemoryState>,
    quota_bytes: Option<usize>,
    timestamp_index: bool,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
            quota_bytes: None,
            timestamp_index: true,
        }
    }

    /// Caps the total size of stored entries.
    #[must_use]
    pub const fn with_quota_bytes(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    /// Behave like a store created before the timestamp index existed.
    #[must_use]
    pub const fn without_timestamp_index(mut self) -> Self {
        self.timestamp_index = false;
        self
    }

    /// Returns the bytes currently accounted against the quota.
    pub async fn used_bytes(&self) -> usize {
        self.state.read().await.bytes
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.state.read().await.entries.get(key).cloned())
    }

    #[instrument(skip(self, entry), fields(store = %self.name, key = %entry.key))]
    async fn put(&self, entry: StoredEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(quota) = self.quota_bytes {
            let replaced = state.entries.get(&entry.key).map_or(0, StoredEntry::size_bytes);
            let needed = state.bytes - replaced + entry.size_bytes();
            if needed > quota {
                return Err(CacheError::quota_exceeded(
                    &self.name,
                    format!("{needed} bytes needed, quota is {quota}"),
                ));
            }
        }
        state.insert(entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.state.write().await.remove(key).is_some())
    }

    async fn delete_partition(&self, partition: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.partition.as_deref() == Some(partition))
            .map(|e| e.key.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        Ok(keys.len())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn evict_oldest(&self, limit: usize) -> Result<usize> {
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .by_time
            .iter()
            .take(limit)
            .map(|(_, key)| key.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        debug!("Evicted {} oldest entries", keys.len());
        Ok(keys.len())
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        if !self.timestamp_index {
            return Err(CacheError::MissingIndex(self.name.clone()));
        }
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .by_time
            .iter()
            .take_while(|(ts, _)| *ts <= cutoff_ms)
            .map(|(_, key)| key.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        Ok(keys.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.entries.len())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write().await = MemoryState::default();
        debug!(store = %self.name, "Cleared all entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, timestamp: i64) -> StoredEntry {
        StoredEntry::encode(key, "0123456789", timestamp, 1).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = InMemoryStore::new("test");

        // Initially no data
        assert!(store.get("a").await.unwrap().is_none());

        let written = entry("a", 10).with_complete(false);
        store.put(written.clone()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(written));
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_index_consistent() {
        let store = InMemoryStore::new("test");
        store.put(entry("a", 10)).await.unwrap();
        store.put(entry("a", 50)).await.unwrap();
        store.put(entry("b", 20)).await.unwrap();

        // "b" is now the oldest; the stale (10, "a") index row is gone
        assert_eq!(store.evict_oldest(1).await.unwrap(), 1);
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.get("a").await.unwrap().unwrap().timestamp, 50);
        assert_eq!(store.used_bytes().await, entry("a", 50).size_bytes());
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_writes() {
        let one = entry("a", 1).size_bytes();
        let store = InMemoryStore::new("small").with_quota_bytes(one * 2);
        store.put(entry("a", 1)).await.unwrap();
        store.put(entry("b", 2)).await.unwrap();

        let err = store.put(entry("c", 3)).await.unwrap_err();
        assert!(matches!(err, CacheError::QuotaExceeded { .. }));

        // Replacing an existing key only counts the difference
        store.put(entry("b", 4)).await.unwrap();

        store.evict_oldest(1).await.unwrap();
        store.put(entry("c", 5)).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let store = InMemoryStore::new("test");
        for (key, ts) in [("a", 100), ("b", 200), ("c", 300)] {
            store.put(entry(key, ts)).await.unwrap();
        }
        assert_eq!(store.delete_older_than(200).await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_store_has_no_index() {
        let store = InMemoryStore::new("legacy").without_timestamp_index();
        store.put(entry("a", 1)).await.unwrap();
        assert!(matches!(
            store.delete_older_than(10).await,
            Err(CacheError::MissingIndex(_))
        ));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_partition_and_clear() {
        let store = InMemoryStore::new("test");
        store.put(entry("s1_2025-01", 1).with_partition("s1")).await.unwrap();
        store.put(entry("s2_2025-01", 2).with_partition("s2")).await.unwrap();

        assert_eq!(store.delete_partition("s1").await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert!(store.is_empty().await.unwrap());
        assert_eq!(store.used_bytes().await, 0);
    }
}
