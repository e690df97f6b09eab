//! The three caches built together from one configuration.

use astro_core::Clock;
use astro_store::StoreHandle;
use std::sync::Arc;
use tracing::debug;

use crate::cleanup::CleanupOrchestrator;
use crate::config::{CacheConfig, StoreKind};
use crate::{EphemerisCache, InterpretationCache, TransitCache};

/// Ephemeris, transit and interpretation caches sharing one clock.
#[derive(Debug, Clone)]
pub struct ChartCaches {
    /// Ephemeris tables.
    pub ephemeris: Arc<EphemerisCache>,
    /// Per-subject monthly transits.
    pub transit: Arc<TransitCache>,
    /// Streamed interpretation text.
    pub interpretation: Arc<InterpretationCache>,
}

impl ChartCaches {
    /// Builds the caches described by `config`. Stores open on first use.
    #[must_use]
    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        debug!(
            directory = ?config.directory,
            enabled = config.enabled,
            "Building chart caches"
        );

        let ephemeris =
            EphemerisCache::new(config.store_handle(StoreKind::Ephemeris), clock.clone())
                .with_ttl(config.ephemeris_ttl())
                .with_quota_policy(config.quota);
        let transit = TransitCache::new(config.store_handle(StoreKind::Transit), clock.clone())
            .with_ttl(config.transit_ttl())
            .with_quota_policy(config.quota);
        let mut interpretation =
            InterpretationCache::new(config.store_handle(StoreKind::Interpretation), clock);
        if let Some(max_age) = config.interpretation_max_age() {
            interpretation = interpretation.with_max_age(max_age);
        }

        Self {
            ephemeris: Arc::new(ephemeris),
            transit: Arc::new(transit),
            interpretation: Arc::new(interpretation),
        }
    }

    /// Caches backed by plain in-memory stores with default settings.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            ephemeris: Arc::new(EphemerisCache::new(
                StoreHandle::memory(StoreKind::Ephemeris.name()),
                clock.clone(),
            )),
            transit: Arc::new(TransitCache::new(
                StoreHandle::memory(StoreKind::Transit.name()),
                clock.clone(),
            )),
            interpretation: Arc::new(InterpretationCache::new(
                StoreHandle::memory(StoreKind::Interpretation.name()),
                clock,
            )),
        }
    }

    /// An orchestrator over these caches, gated by the process-wide latch.
    #[must_use]
    pub fn orchestrator(&self) -> CleanupOrchestrator {
        CleanupOrchestrator::new(
            self.ephemeris.clone(),
            self.transit.clone(),
            self.interpretation.clone(),
        )
    }
}
