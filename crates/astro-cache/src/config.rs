//! Configuration for the chart data caches.

use astro_core::{CacheError, Result};
use astro_store::StoreHandle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ephemeris::DEFAULT_EPHEMERIS_TTL;
use crate::quota::QuotaPolicy;
use crate::transit::DEFAULT_TRANSIT_TTL;

/// The three independent stores behind the caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Ephemeris tables.
    Ephemeris,
    /// Per-subject monthly transits.
    Transit,
    /// Streamed interpretation text.
    Interpretation,
}

impl StoreKind {
    /// All store kinds.
    pub const ALL: [Self; 3] = [Self::Ephemeris, Self::Transit, Self::Interpretation];

    /// Store name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ephemeris => "ephemeris",
            Self::Transit => "transits",
            Self::Interpretation => "interpretations",
        }
    }

    /// Database file name under the cache directory.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Ephemeris => "ephemeris.db",
            Self::Transit => "transits.db",
            Self::Interpretation => "interpretations.db",
        }
    }
}

/// Settings for the chart data caches.
///
/// Every field has a default, so a config document only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the database files. `None` keeps them in memory.
    pub directory: Option<PathBuf>,
    /// When false the caches keep nothing.
    pub enabled: bool,
    /// Freshness window of ephemeris entries, in seconds.
    pub ephemeris_ttl_secs: u64,
    /// Freshness window of transit entries, in seconds.
    pub transit_ttl_secs: u64,
    /// Age at which interpretation drafts are swept, in seconds. `None` keeps
    /// them until deleted.
    pub interpretation_max_age_secs: Option<u64>,
    /// Page quota applied to each database.
    pub max_page_count: Option<u32>,
    /// Eviction policy used when a store is full.
    pub quota: QuotaPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            enabled: true,
            ephemeris_ttl_secs: DEFAULT_EPHEMERIS_TTL.as_secs(),
            transit_ttl_secs: DEFAULT_TRANSIT_TTL.as_secs(),
            interpretation_max_age_secs: None,
            max_page_count: None,
            quota: QuotaPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidParameter`] if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidParameter(format!("cache config: {e}")))
    }

    /// Store the databases under `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Turn the caches off.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set the ephemeris freshness window.
    #[must_use]
    pub const fn with_ephemeris_ttl(mut self, ttl: Duration) -> Self {
        self.ephemeris_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the transit freshness window.
    #[must_use]
    pub const fn with_transit_ttl(mut self, ttl: Duration) -> Self {
        self.transit_ttl_secs = ttl.as_secs();
        self
    }

    /// Sweep interpretation drafts older than `max_age`.
    #[must_use]
    pub const fn with_interpretation_max_age(mut self, max_age: Duration) -> Self {
        self.interpretation_max_age_secs = Some(max_age.as_secs());
        self
    }

    /// Cap each database at `pages` pages.
    #[must_use]
    pub const fn with_max_page_count(mut self, pages: u32) -> Self {
        self.max_page_count = Some(pages);
        self
    }

    /// Set the quota recovery policy.
    #[must_use]
    pub const fn with_quota_policy(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    /// Ephemeris freshness window.
    #[must_use]
    pub const fn ephemeris_ttl(&self) -> Duration {
        Duration::from_secs(self.ephemeris_ttl_secs)
    }

    /// Transit freshness window.
    #[must_use]
    pub const fn transit_ttl(&self) -> Duration {
        Duration::from_secs(self.transit_ttl_secs)
    }

    /// Interpretation sweep age, if any.
    #[must_use]
    pub fn interpretation_max_age(&self) -> Option<Duration> {
        self.interpretation_max_age_secs.map(Duration::from_secs)
    }

    /// Returns the database path of `kind`, if the caches persist to disk.
    #[must_use]
    pub fn store_path(&self, kind: StoreKind) -> Option<PathBuf> {
        self.directory.as_ref().map(|dir| dir.join(kind.file_name()))
    }

    /// Builds the lazily opened handle for `kind`.
    ///
    /// Disabled caches get a store that keeps nothing.
    #[must_use]
    pub fn store_handle(&self, kind: StoreKind) -> StoreHandle {
        if !self.enabled {
            return StoreHandle::noop(kind.name());
        }
        self.enabled_handle(kind)
    }

    #[cfg(feature = "sqlite")]
    fn enabled_handle(&self, kind: StoreKind) -> StoreHandle {
        use astro_store::SqliteOptions;

        let mut options = SqliteOptions::default();
        if kind == StoreKind::Transit {
            options = options.with_partition_index();
        }
        if let Some(pages) = self.max_page_count {
            options = options.with_max_page_count(pages);
        }

        match self.store_path(kind) {
            Some(path) => StoreHandle::sqlite(kind.name(), path, options),
            None => StoreHandle::sqlite_in_memory(kind.name(), options),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    fn enabled_handle(&self, kind: StoreKind) -> StoreHandle {
        StoreHandle::memory(kind.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ephemeris_ttl(), Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(config.transit_ttl(), Duration::from_secs(5 * 24 * 60 * 60));
        assert_eq!(config.interpretation_max_age(), None);
        assert_eq!(config.quota, QuotaPolicy::default());
        assert_eq!(config.store_path(StoreKind::Ephemeris), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CacheConfig::from_json_str(
            r#"{
                "directory": "/var/cache/astro",
                "transit_ttl_secs": 3600,
                "quota": { "max_retries": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.transit_ttl(), Duration::from_secs(3600));
        assert_eq!(config.ephemeris_ttl(), DEFAULT_EPHEMERIS_TTL);
        assert_eq!(config.quota.max_retries, 5);
        assert_eq!(config.quota.initial_eviction, 10);
        assert_eq!(
            config.store_path(StoreKind::Transit),
            Some(PathBuf::from("/var/cache/astro/transits.db"))
        );
    }

    #[test]
    fn test_malformed_json_is_invalid_parameter() {
        let err = CacheConfig::from_json_str("{\"enabled\": \"yes\"}").unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameter(_)));
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::default()
            .with_interpretation_max_age(Duration::from_secs(7 * 24 * 60 * 60))
            .with_max_page_count(64)
            .disabled();

        assert!(!config.enabled);
        assert_eq!(config.max_page_count, Some(64));
        assert_eq!(
            config.interpretation_max_age(),
            Some(Duration::from_secs(604_800))
        );
    }

    #[test]
    fn test_file_names() {
        let names: Vec<_> = StoreKind::ALL.iter().map(StoreKind::file_name).collect();
        assert_eq!(names, ["ephemeris.db", "transits.db", "interpretations.db"]);
    }

    #[tokio::test]
    async fn test_disabled_config_keeps_nothing() {
        let handle = CacheConfig::default().disabled().store_handle(StoreKind::Ephemeris);
        let store = handle.open().await.unwrap();
        let entry = astro_core::StoredEntry::encode("k", &1, 0, 1).unwrap();

        store.put(entry).await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_handle_opens_lazily() {
        let handle = CacheConfig::default().store_handle(StoreKind::Transit);
        assert_eq!(handle.name(), "transits");
        assert!(!handle.is_open());

        handle.open().await.unwrap();
        handle.open().await.unwrap();

        assert!(handle.is_open());
        assert_eq!(handle.open_count(), 1);
    }
}
