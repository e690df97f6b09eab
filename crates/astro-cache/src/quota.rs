//! Storage-quota recovery shared by the TTL caches.
//!
//! A write that fails because the store is full is retried after evicting the
//! oldest entries. Each retry evicts twice as many entries as the last, up to
//! a ceiling, for a bounded number of retries.

use astro_core::{CacheError, EntryStore, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, instrument, warn};

/// Limits of the eviction-and-retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaPolicy {
    /// Entries evicted on the first recovery pass.
    pub initial_eviction: usize,
    /// Upper bound on entries evicted in one pass.
    pub max_eviction: usize,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
}

impl QuotaPolicy {
    /// Default number of entries evicted on the first pass.
    pub const DEFAULT_INITIAL_EVICTION: usize = 10;
    /// Default ceiling on entries evicted per pass.
    pub const DEFAULT_MAX_EVICTION: usize = 200;
    /// Default number of retries.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Returns how many entries the given retry (1-based) evicts.
    #[must_use]
    pub fn eviction_size(&self, retry: u32) -> usize {
        let doublings = retry.saturating_sub(1).min(usize::BITS - 1);
        self.initial_eviction
            .saturating_mul(1usize << doublings)
            .min(self.max_eviction)
            .max(1)
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            initial_eviction: Self::DEFAULT_INITIAL_EVICTION,
            max_eviction: Self::DEFAULT_MAX_EVICTION,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Returns true if `err` reports that the store ran out of space.
///
/// This is the only place the recovery loop classifies errors; backends map
/// their engine-specific capacity failures to [`CacheError::QuotaExceeded`].
#[must_use]
pub const fn is_quota_exceeded(err: &CacheError) -> bool {
    matches!(err, CacheError::QuotaExceeded { .. })
}

/// Runs `write`, evicting the oldest entries of `store` and retrying when it
/// fails with a quota error.
///
/// Errors other than quota failures are returned untouched. When an eviction
/// pass frees nothing, or the retries run out, the quota error is returned.
///
/// # Errors
/// Returns the first non-quota error, or the last quota error once recovery
/// gives up.
#[instrument(skip(store, policy, write), fields(store = store.name()))]
pub async fn write_with_recovery<F, Fut>(
    store: &dyn EntryStore,
    policy: &QuotaPolicy,
    mut write: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut retry = 0u32;
    loop {
        let err = match write().await {
            Ok(()) => return Ok(()),
            Err(err) if !is_quota_exceeded(&err) => return Err(err),
            Err(err) => err,
        };

        if retry >= policy.max_retries {
            warn!(retries = retry, error = %err, "Quota recovery exhausted");
            return Err(err);
        }
        retry += 1;

        let limit = policy.eviction_size(retry);
        let evicted = match store.evict_oldest(limit).await {
            Ok(evicted) => evicted,
            Err(evict_err) => {
                warn!(error = %evict_err, "Eviction failed during quota recovery");
                0
            }
        };

        if evicted == 0 {
            warn!(error = %err, "Quota exceeded and nothing left to evict");
            return Err(err);
        }

        info!(
            evicted,
            retry,
            reason = "storage quota exceeded",
            "Evicted oldest cache entries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astro_core::StoredEntry;
    use astro_store::InMemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quota_error() -> CacheError {
        CacheError::quota_exceeded("test", "full")
    }

    async fn filled(count: i64) -> InMemoryStore {
        let store = InMemoryStore::new("test");
        for i in 0..count {
            let entry = StoredEntry::encode(format!("k{i}"), &i, i, 1).unwrap();
            store.put(entry).await.unwrap();
        }
        store
    }

    #[test]
    fn test_eviction_sizes_double_and_cap() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.eviction_size(1), 10);
        assert_eq!(policy.eviction_size(2), 20);
        assert_eq!(policy.eviction_size(3), 40);
        assert_eq!(policy.eviction_size(6), 200);
        assert_eq!(policy.eviction_size(200), 200);
    }

    #[test]
    fn test_predicate_only_matches_quota() {
        assert!(is_quota_exceeded(&quota_error()));
        assert!(!is_quota_exceeded(&CacheError::Storage("disk I/O error".into())));
        assert!(!is_quota_exceeded(&CacheError::Serialization("bad".into())));
        assert!(!is_quota_exceeded(&CacheError::MissingIndex("x".into())));
    }

    #[tokio::test]
    async fn test_success_without_recovery() {
        let store = filled(5).await;
        let calls = &AtomicUsize::new(0);

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_recovers_after_evicting_oldest() {
        let store = filled(25).await;
        let calls = &AtomicUsize::new(0);

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(quota_error())
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await.unwrap(), 15);
        // The ten oldest went first
        assert!(store.get("k9").await.unwrap().is_none());
        assert!(store.get("k10").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_grows_between_retries() {
        let store = filled(100).await;
        let calls = &AtomicUsize::new(0);

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(quota_error())
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 10 + 20 + 40 evicted
        assert_eq!(store.len().await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let store = filled(500).await;
        let calls = &AtomicUsize::new(0);

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(quota_error())
        })
        .await;

        assert_eq!(result, Err(quota_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.len().await.unwrap(), 500 - 70);
    }

    #[tokio::test]
    async fn test_empty_store_reraises_immediately() {
        let store = InMemoryStore::new("empty");
        let calls = &AtomicUsize::new(0);

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(quota_error())
        })
        .await;

        assert_eq!(result, Err(quota_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let store = filled(20).await;
        let calls = &AtomicUsize::new(0);
        let storage = CacheError::Storage("database disk image is malformed".into());
        let returned = &storage;

        let result = write_with_recovery(&store, &QuotaPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(returned.clone())
        })
        .await;

        assert_eq!(result, Err(storage));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_converges_against_real_quota() {
        let probe = StoredEntry::encode("probe", &"x".repeat(100), 0, 1).unwrap();
        let store = Arc::new(InMemoryStore::new("tight").with_quota_bytes(probe.size_bytes() * 12));
        for i in 0..12 {
            let entry = StoredEntry::encode(format!("e{i:02}"), &"x".repeat(100), i, 1).unwrap();
            store.put(entry).await.unwrap();
        }

        let incoming = StoredEntry::encode("fresh", &"y".repeat(100), 99, 1).unwrap();
        let result = write_with_recovery(store.as_ref(), &QuotaPolicy::default(), || {
            store.put(incoming.clone())
        })
        .await;

        assert!(result.is_ok());
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("e00").await.unwrap().is_none());
    }
}
