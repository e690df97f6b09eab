//! Shared fixtures for the cache tests.

use astro_core::{CacheError, EntryStore, Result, StoredEntry};
use async_trait::async_trait;

/// A store whose every operation fails with a non-quota error.
#[derive(Debug)]
pub(crate) struct BrokenStore;

fn broken<T>() -> Result<T> {
    Err(CacheError::Storage("disk I/O error".into()))
}

#[async_trait]
impl EntryStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
        broken()
    }

    async fn put(&self, _entry: StoredEntry) -> Result<()> {
        broken()
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        broken()
    }

    async fn delete_partition(&self, _partition: &str) -> Result<usize> {
        broken()
    }

    async fn evict_oldest(&self, _limit: usize) -> Result<usize> {
        broken()
    }

    async fn delete_older_than(&self, _cutoff_ms: i64) -> Result<usize> {
        broken()
    }

    async fn len(&self) -> Result<usize> {
        broken()
    }

    async fn clear(&self) -> Result<()> {
        broken()
    }
}
