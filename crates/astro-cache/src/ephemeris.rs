//! Cache of daily planetary positions keyed by date range.

use astro_core::{Clock, EphemerisDay, Result, StoredEntry};
use astro_store::StoreHandle;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::freshness::{read_fresh, sweep_store};
use crate::quota::{QuotaPolicy, write_with_recovery};

/// Payload format version of ephemeris entries.
pub const EPHEMERIS_SCHEMA_VERSION: u32 = 1;

/// Default freshness window of an ephemeris entry (30 days).
pub const DEFAULT_EPHEMERIS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Returns the cache key for a date range, e.g. `2024-01-01_to_2024-01-31`.
///
/// Only the calendar dates take part; pass `DateTime::date_naive()` for
/// timestamps.
#[must_use]
pub fn ephemeris_key(start: NaiveDate, end: NaiveDate) -> String {
    format!("{}_to_{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
}

/// Caches ephemeris tables so repeated chart renders skip the remote service.
///
/// Failures never reach the caller: a broken store reads as a miss and
/// swallows writes.
#[derive(Debug)]
pub struct EphemerisCache {
    handle: StoreHandle,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    quota: QuotaPolicy,
}

impl EphemerisCache {
    /// Create a cache over `handle` with the default TTL and quota policy.
    #[must_use]
    pub fn new(handle: StoreHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            ttl: DEFAULT_EPHEMERIS_TTL,
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

    /// Returns the cached positions for `start..=end`, or `None` on a miss.
    #[instrument(skip(self), fields(store = self.handle.name()))]
    pub async fn get(&self, start: NaiveDate, end: NaiveDate) -> Option<Vec<EphemerisDay>> {
        let key = ephemeris_key(start, end);
        match self.try_get(&key).await {
            Ok(days) => days,
            Err(e) => {
                warn!(key = %key, error = %e, "Ephemeris cache read failed");
                None
            }
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<EphemerisDay>>> {
        let store = self.handle.open().await?;
        read_fresh(
            store.as_ref(),
            key,
            self.ttl,
            self.clock.now_ms(),
            EPHEMERIS_SCHEMA_VERSION,
        )
        .await
    }

    /// Stores the positions for `start..=end`, evicting old entries if the
    /// store is full.
    #[instrument(skip(self, days), fields(store = self.handle.name(), days = days.len()))]
    pub async fn set(&self, start: NaiveDate, end: NaiveDate, days: &[EphemerisDay]) {
        let key = ephemeris_key(start, end);
        match self.try_set(&key, days).await {
            Ok(()) => debug!(key = %key, "Cached ephemeris"),
            Err(e) => warn!(key = %key, error = %e, "Failed to cache ephemeris"),
        }
    }

    async fn try_set(&self, key: &str, days: &[EphemerisDay]) -> Result<()> {
        let store = self.handle.open().await?;
        let entry = StoredEntry::encode(key, days, self.clock.now_ms(), EPHEMERIS_SCHEMA_VERSION)?;
        write_with_recovery(store.as_ref(), &self.quota, || store.put(entry.clone())).await
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
                warn!(error = %e, "Ephemeris sweep failed");
                0
            }
        }
    }
}
