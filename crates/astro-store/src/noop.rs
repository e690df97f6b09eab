//! No-op store implementation.

use astro_core::{EntryStore, Result, StoredEntry};
use async_trait::async_trait;
use tracing::trace;

/// A store that doesn't keep anything.
///
/// Every `get` misses and every write succeeds without effect. Selected when
/// persistent storage is disabled or unavailable in the host environment.
#[derive(Debug, Clone, Default)]
pub struct NoopStore {
    name: String,
}

impl NoopStore {
    /// Create a new no-op store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl EntryStore for NoopStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
        trace!("NoopStore: get called, returning None");
        Ok(None)
    }

    async fn put(&self, _entry: StoredEntry) -> Result<()> {
        trace!("NoopStore: put called, doing nothing");
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn delete_partition(&self, _partition: &str) -> Result<usize> {
        Ok(0)
    }

    async fn evict_oldest(&self, _limit: usize) -> Result<usize> {
        trace!("NoopStore: evict_oldest called, returning 0");
        Ok(0)
    }

    async fn delete_older_than(&self, _cutoff_ms: i64) -> Result<usize> {
        Ok(0)
    }

    async fn len(&self) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        trace!("NoopStore: clear called, doing nothing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_never_holds_entries() {
        let store = NoopStore::new("disabled");
        let entry = StoredEntry::encode("k", "v", 1, 1).unwrap();

        assert!(store.put(entry).await.is_ok());
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_noop_store_management() {
        let store = NoopStore::new("disabled");
        assert_eq!(store.evict_oldest(10).await.unwrap(), 0);
        assert_eq!(store.delete_older_than(i64::MAX).await.unwrap(), 0);
        assert!(store.clear().await.is_ok());
        assert_eq!(store.name(), "disabled");
    }
}
