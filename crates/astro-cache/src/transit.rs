//! Cache of per-subject monthly transit computations.
//!
//! A month is only trusted when it holds a row for every calendar day: a
//! computation interrupted half way must not pass for a complete month.

use astro_core::{Clock, Result, StoredEntry, SubjectId, TransitDay, YearMonth};
use astro_store::StoreHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::freshness::{read_fresh, sweep_store};
use crate::quota::{QuotaPolicy, write_with_recovery};

/// Payload format version of transit entries.
pub const TRANSIT_SCHEMA_VERSION: u32 = 1;

/// Default freshness window of a transit month (5 days).
pub const DEFAULT_TRANSIT_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Returns the cache key for a subject's month, e.g. `s1_2025-02`.
#[must_use]
pub fn transit_key(subject: &SubjectId, month: YearMonth) -> String {
    format!("{subject}_{month}")
}

/// Caches day-by-day transits for one subject and one calendar month.
#[derive(Debug)]
pub struct TransitCache {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    quota: QuotaPolicy,
}

impl TransitCache {
    /// Create a cache over `handle` with the default TTL and quota policy.
    #[must_use]
    pub fn new(handle: StoreHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            ttl: DEFAULT_TRANSIT_TTL,
            quota: QuotaPolicy::default(),
        }
    }

    /// Set the freshness window.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the quota recovery policy.
    #[must_use]
    pub const fn with_quota_policy(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    /// Returns the freshness window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached transits for `subject` in `month`.
    ///
    /// Misses when the entry is absent, expired, or has fewer rows than the
    /// month has days; the latter two are deleted on the way out.
    #[instrument(skip_all, fields(store = self.handle.name(), subject = %subject, month = %month))]
    pub async fn get(&self, subject: &SubjectId, month: YearMonth) -> Option<Vec<TransitDay>> {
        let key = transit_key(subject, month);
        match self.try_get(&key, month).await {
            Ok(days) => days,
            Err(e) => {
                warn!(key = %key, error = %e, "Transit cache read failed");
                None
            }
        }
    }

    async fn try_get(&self, key: &str, month: YearMonth) -> Result<Option<Vec<TransitDay>>> {
        let store = self.handle.open().await?;
        let Some(days) = read_fresh::<Vec<TransitDay>>(
            store.as_ref(),
            key,
            self.ttl,
            self.clock.now_ms(),
            TRANSIT_SCHEMA_VERSION,
        )
        .await?
        else {
            return Ok(None);
        };

        let expected = month.days_in_month() as usize;
        if days.len() < expected {
            debug!(
                key,
                found = days.len(),
                expected,
                "Dropping incomplete transit month"
            );
            store.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(days))
    }

    /// Stores the transits for `subject` in `month`, evicting old entries if
    /// the store is full.
    #[instrument(skip_all, fields(store = self.handle.name(), subject = %subject, month = %month, days = days.len()))]
    pub async fn set(&self, subject: &SubjectId, month: YearMonth, days: &[TransitDay]) {
        let key = transit_key(subject, month);
        match self.try_set(&key, subject, days).await {
            Ok(()) => debug!(key = %key, "Cached transits"),
            Err(e) => warn!(key = %key, error = %e, "Failed to cache transits"),
        }
    }

    async fn try_set(&self, key: &str, subject: &SubjectId, days: &[TransitDay]) -> Result<()> {
        let store = self.handle.open().await?;
        let entry = StoredEntry::encode(key, days, self.clock.now_ms(), TRANSIT_SCHEMA_VERSION)?
            .with_partition(subject.as_str());
        write_with_recovery(store.as_ref(), &self.quota, || store.put(entry.clone())).await
    }

    /// Deletes every month cached for `subject` and returns how many went.
    ///
    /// Used when a subject's birth data changes and every computed month is
    /// wrong at once.
    #[instrument(skip_all, fields(store = self.handle.name(), subject = %subject))]
    pub async fn invalidate_subject(&self, subject: &SubjectId) -> usize {
        let result = match self.handle.open().await {
            Ok(store) => store.delete_partition(subject.as_str()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(deleted) => {
                debug!(deleted, "Invalidated subject transits");
                deleted
            }
            Err(e) => {
                warn!(error = %e, "Failed to invalidate subject transits");
                0
            }
        }
    }

    /// Deletes every entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or cleared.
    #[instrument(skip(self), fields(store = self.handle.name()))]
    pub async fn clear(&self) -> Result<()> {
        self.handle.open().await?.clear().await
    }

    /// Deletes every entry older than the TTL and returns how many went.
    #[instrument(skip(self), fields(store = self.handle.name()))]
    pub async fn sweep_expired(&self) -> usize {
        let result = match self.handle.open().await {
            Ok(store) => sweep_store(store.as_ref(), self.ttl, self.clock.now_ms()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Transit sweep failed");
                0
            }
        }
    }
}
