//! Freshness checks shared by the TTL caches.

use astro_core::{CacheError, EntryStore, Result, duration_ms};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Reads `key` and returns its payload only if the entry is current.
///
/// Entries written under another schema version, older than `ttl`, or whose
/// payload no longer decodes are deleted and reported as a miss.
pub(crate) async fn read_fresh<T: DeserializeOwned>(
    store: &dyn EntryStore,
    key: &str,
    ttl: Duration,
    now_ms: i64,
    schema_version: u32,
) -> Result<Option<T>> {
    let Some(entry) = store.get(key).await? else {
        debug!(key, "Cache miss");
        return Ok(None);
    };

    if entry.schema_version != schema_version {
        debug!(
            key,
            found = entry.schema_version,
            expected = schema_version,
            "Dropping entry written with another schema version"
        );
        store.delete(key).await?;
        return Ok(None);
    }

    let age_ms = entry.age_ms(now_ms);
    if age_ms >= duration_ms(ttl) {
        debug!(key, age_ms, "Dropping expired entry");
        store.delete(key).await?;
        return Ok(None);
    }

    match entry.decode::<T>() {
        Ok(payload) => {
            debug!(key, age_ms, "Cache hit");
            Ok(Some(payload))
        }
        Err(e) => {
            warn!(key, error = %e, "Dropping undecodable entry");
            store.delete(key).await?;
            Ok(None)
        }
    }
}

/// Deletes every entry of `store` at least `max_age` old.
///
/// A store without a timestamp index is left alone and reports zero.
pub(crate) async fn sweep_store(
    store: &dyn EntryStore,
    max_age: Duration,
    now_ms: i64,
) -> Result<usize> {
    let cutoff_ms = now_ms.saturating_sub(duration_ms(max_age));
    match store.delete_older_than(cutoff_ms).await {
        Ok(deleted) => Ok(deleted),
        Err(CacheError::MissingIndex(name)) => {
            debug!(store = %name, "No timestamp index, skipping sweep");
            Ok(0)
        }
        Err(e) => Err(e),
    }
}
