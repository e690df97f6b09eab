//! Cache of in-progress AI interpretation text.
//!
//! Entries are keyed by chart id verbatim and hold the full text accumulated
//! so far plus a completion flag. Each chunk overwrites the previous one, so a
//! reader always sees a prefix of the final text. The owning flow deletes the
//! entry once the text is saved on the server or discarded.

use astro_core::{ChartId, Clock, InterpretationEntry, Result, StoredEntry};
use astro_store::StoreHandle;
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

use crate::freshness::sweep_store;

/// Payload format version of interpretation entries.
pub const INTERPRETATION_SCHEMA_VERSION: u32 = 1;

/// Caches streamed interpretation text per chart.
///
/// Writers go straight to the store: one small text blob per chart does not
/// warrant quota recovery. At most one writer per chart id at a time.
#[derive(Debug)]
pub struct InterpretationCache {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    max_age: Option<Duration>,
}

impl InterpretationCache {
    /// Create a cache over `handle`. Entries never expire by age.
    #[must_use]
    pub fn new(handle: StoreHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            max_age: None,
        }
    }

    /// Lets [`sweep_expired`](Self::sweep_expired) delete entries older than `max_age`.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Returns the sweep age, if any.
    #[must_use]
    pub const fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Overwrites the entry for `chart_id` with the text accumulated so far.
    #[instrument(skip_all, fields(store = self.handle.name(), chart = %chart_id, len = content.len()))]
    pub async fn save_chunk(&self, chart_id: &ChartId, content: &str, is_complete: bool) {
        match self.try_save(chart_id, content, is_complete).await {
            Ok(()) => trace!(is_complete, "Saved interpretation chunk"),
            Err(e) => warn!(error = %e, "Failed to save interpretation chunk"),
        }
    }

    async fn try_save(&self, chart_id: &ChartId, content: &str, is_complete: bool) -> Result<()> {
        let store = self.handle.open().await?;
        let entry = StoredEntry::encode(
            chart_id.as_str(),
            content,
            self.clock.now_ms(),
            INTERPRETATION_SCHEMA_VERSION,
        )?
        .with_complete(is_complete);
        store.put(entry).await
    }

    /// Returns the cached text for `chart_id`. No freshness check applies.
    #[instrument(skip_all, fields(store = self.handle.name(), chart = %chart_id))]
    pub async fn get(&self, chart_id: &ChartId) -> Option<InterpretationEntry> {
        match self.try_get(chart_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Interpretation cache read failed");
                None
            }
        }
    }

    async fn try_get(&self, chart_id: &ChartId) -> Result<Option<InterpretationEntry>> {
        let store = self.handle.open().await?;
        let key = chart_id.as_str();
        let Some(entry) = store.get(key).await? else {
            debug!("Cache miss");
            return Ok(None);
        };

        if entry.schema_version != INTERPRETATION_SCHEMA_VERSION {
            debug!(
                found = entry.schema_version,
                "Dropping interpretation written with another schema version"
            );
            store.delete(key).await?;
            return Ok(None);
        }

        let content = match entry.decode::<String>() {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable interpretation");
                store.delete(key).await?;
                return Ok(None);
            }
        };

        debug!(is_complete = ?entry.complete, "Cache hit");
        Ok(Some(InterpretationEntry {
            chart_id: chart_id.clone(),
            content,
            is_complete: entry.complete.unwrap_or(false),
            timestamp: entry.timestamp,
        }))
    }

    /// Removes the entry for `chart_id`. Returns true if one existed.
    #[instrument(skip_all, fields(store = self.handle.name(), chart = %chart_id))]
    pub async fn delete(&self, chart_id: &ChartId) -> bool {
        let result = match self.handle.open().await {
            Ok(store) => store.delete(chart_id.as_str()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(existed) => existed,
            Err(e) => {
                warn!(error = %e, "Failed to delete interpretation");
                false
            }
        }
    }

    /// Deletes every entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or cleared.
    #[instrument(skip(self), fields(store = self.handle.name()))]
    pub async fn clear_all(&self) -> Result<()> {
        self.handle.open().await?.clear().await
    }

    /// Deletes entries older than the configured max age.
    ///
    /// Without a max age nothing is swept and the store is not opened.
    #[instrument(skip(self), fields(store = self.handle.name()))]
    pub async fn sweep_expired(&self) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let result = match self.handle.open().await {
            Ok(store) => sweep_store(store.as_ref(), max_age, self.clock.now_ms()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Interpretation sweep failed");
                0
            }
        }
    }

    /// Consumes a stream of text increments, saving the accumulated text after
    /// each one and marking it complete when the stream ends.
    ///
    /// Returns the full text.
    ///
    /// # Errors
    /// Returns the first transport error. The text received up to that point
    /// stays cached as incomplete.
    #[instrument(skip_all, fields(store = self.handle.name(), chart = %chart_id))]
    pub async fn record_stream<S>(&self, chart_id: &ChartId, increments: S) -> Result<String>
    where
        S: Stream<Item = Result<String>>,
    {
        let mut increments = pin!(increments);
        let mut content = String::new();
        let mut chunks = 0usize;

        while let Some(increment) = increments.next().await {
            match increment {
                Ok(text) => {
                    content.push_str(&text);
                    chunks += 1;
                    self.save_chunk(chart_id, &content, false).await;
                }
                Err(e) => {
                    warn!(chunks, error = %e, "Interpretation stream failed");
                    return Err(e);
                }
            }
        }

        self.save_chunk(chart_id, &content, true).await;
        debug!(chunks, len = content.len(), "Interpretation stream finished");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BrokenStore;
    use astro_core::{CacheError, EntryStore, ManualClock};
    use astro_store::InMemoryStore;
    use futures::stream;

    const T0: i64 = 1_735_689_600_000;

    fn cache() -> (InterpretationCache, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new("interpretations"));
        let clock = Arc::new(ManualClock::new(T0));
        let cache =
            InterpretationCache::new(StoreHandle::from_store(store.clone()), clock.clone());
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_chunks_overwrite_and_complete() {
        let (cache, store, clock) = cache();
        let chart = ChartId::new("chart-42");

        cache.save_chunk(&chart, "Sun in", false).await;
        let partial = cache.get(&chart).await.unwrap();
        assert_eq!(partial.content, "Sun in");
        assert!(!partial.is_complete);

        clock.advance(Duration::from_secs(2));
        cache.save_chunk(&chart, "Sun in Leo.", true).await;
        let done = cache.get(&chart).await.unwrap();
        assert_eq!(done.content, "Sun in Leo.");
        assert!(done.is_complete);
        assert_eq!(done.timestamp, T0 + 2_000);
        assert_eq!(done.chart_id, chart);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_key_is_chart_id_verbatim() {
        let (cache, store, _) = cache();
        let chart = ChartId::new("natal/2025 #1");

        cache.save_chunk(&chart, "text", true).await;

        assert!(store.get("natal/2025 #1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_age_expiry_by_default() {
        let (cache, _, clock) = cache();
        let chart = ChartId::new("c1");
        cache.save_chunk(&chart, "draft", false).await;

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));

        assert_eq!(cache.sweep_expired().await, 0);
        assert_eq!(cache.get(&chart).await.map(|e| e.content), Some("draft".into()));
    }

    #[tokio::test]
    async fn test_sweep_with_max_age() {
        let store = Arc::new(InMemoryStore::new("interpretations"));
        let clock = Arc::new(ManualClock::new(T0));
        let cache = InterpretationCache::new(StoreHandle::from_store(store.clone()), clock.clone())
            .with_max_age(Duration::from_secs(60));
        cache.save_chunk(&ChartId::new("old"), "a", true).await;
        clock.advance(Duration::from_secs(30));
        cache.save_chunk(&ChartId::new("new"), "b", true).await;
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.sweep_expired().await, 1);
        assert!(cache.get(&ChartId::new("new")).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (cache, store, _) = cache();
        let (c1, c2) = (ChartId::new("c1"), ChartId::new("c2"));
        cache.save_chunk(&c1, "one", true).await;
        cache.save_chunk(&c2, "two", false).await;

        assert!(cache.delete(&c1).await);
        assert!(!cache.delete(&c1).await);
        assert!(cache.get(&c1).await.is_none());

        cache.clear_all().await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_flag_reads_as_incomplete() {
        let (cache, store, _) = cache();
        let entry = StoredEntry::encode("c1", "legacy", T0, INTERPRETATION_SCHEMA_VERSION).unwrap();
        store.put(entry).await.unwrap();

        let read = cache.get(&ChartId::new("c1")).await.unwrap();
        assert_eq!(read.content, "legacy");
        assert!(!read.is_complete);
    }

    #[tokio::test]
    async fn test_record_stream_accumulates_and_completes() {
        let (cache, _, _) = cache();
        let chart = ChartId::new("c1");
        let increments = stream::iter(
            ["Mars ", "squares ", "Venus."].map(|s| Ok::<_, CacheError>(s.to_string())),
        );

        let text = cache.record_stream(&chart, increments).await.unwrap();

        assert_eq!(text, "Mars squares Venus.");
        let entry = cache.get(&chart).await.unwrap();
        assert_eq!(entry.content, text);
        assert!(entry.is_complete);
    }

    #[tokio::test]
    async fn test_record_stream_reader_sees_prefix() {
        let (cache, _, _) = cache();
        let cache = &cache;
        let chart = &ChartId::new("c1");
        let seen = &tokio::sync::Mutex::new(Vec::new());

        // Reads between increments observe the text saved so far
        let increments = stream::iter(["a", "b", "c"]).then(move |s| async move {
            if let Some(entry) = cache.get(chart).await {
                seen.lock().await.push((entry.content, entry.is_complete));
            }
            Ok::<_, CacheError>(s.to_string())
        });
        cache.record_stream(chart, increments).await.unwrap();

        assert_eq!(
            *seen.lock().await,
            vec![("a".to_string(), false), ("ab".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_record_stream_error_keeps_partial() {
        let (cache, _, _) = cache();
        let chart = ChartId::new("c1");
        let increments = stream::iter(vec![
            Ok("Moon ".to_string()),
            Ok("trine ".to_string()),
            Err(CacheError::Source("connection reset".into())),
            Ok("never".to_string()),
        ]);

        let result = cache.record_stream(&chart, increments).await;

        assert_eq!(result, Err(CacheError::Source("connection reset".into())));
        let entry = cache.get(&chart).await.unwrap();
        assert_eq!(entry.content, "Moon trine ");
        assert!(!entry.is_complete);
    }

    #[tokio::test]
    async fn test_storage_failures_degrade() {
        let cache = InterpretationCache::new(
            StoreHandle::from_store(Arc::new(BrokenStore)),
            Arc::new(ManualClock::new(T0)),
        )
        .with_max_age(Duration::from_secs(1));
        let chart = ChartId::new("c1");

        cache.save_chunk(&chart, "text", false).await;
        assert!(cache.get(&chart).await.is_none());
        assert!(!cache.delete(&chart).await);
        assert_eq!(cache.sweep_expired().await, 0);
        assert!(cache.clear_all().await.is_err());

        let increments = stream::iter([Ok::<_, CacheError>("still streams".to_string())]);
        let text = cache.record_stream(&chart, increments).await;
        assert_eq!(text, Ok("still streams".to_string()));
    }
}
