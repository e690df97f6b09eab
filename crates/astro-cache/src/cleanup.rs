//! Once-per-session cleanup of expired cache entries.

use astro_core::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{EphemerisCache, InterpretationCache, TransitCache};

/// A cache the orchestrator can sweep and clear.
#[async_trait]
pub trait ExpiringCache: Send + Sync + Debug {
    /// Returns the cache name used in logs.
    fn name(&self) -> &str;

    /// Deletes expired entries and returns how many went. Never fails.
    async fn sweep_expired(&self) -> usize;

    /// Deletes every entry.
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl ExpiringCache for EphemerisCache {
    fn name(&self) -> &str {
        "ephemeris"
    }

    async fn sweep_expired(&self) -> usize {
        Self::sweep_expired(self).await
    }

    async fn clear(&self) -> Result<()> {
        Self::clear(self).await
    }
}

#[async_trait]
impl ExpiringCache for TransitCache {
    fn name(&self) -> &str {
        "transit"
    }

    async fn sweep_expired(&self) -> usize {
        Self::sweep_expired(self).await
    }

    async fn clear(&self) -> Result<()> {
        Self::clear(self).await
    }
}

#[async_trait]
impl ExpiringCache for InterpretationCache {
    fn name(&self) -> &str {
        "interpretation"
    }

    async fn sweep_expired(&self) -> usize {
        Self::sweep_expired(self).await
    }

    async fn clear(&self) -> Result<()> {
        self.clear_all().await
    }
}

static GLOBAL_LATCH: OnceLock<Arc<SessionLatch>> = OnceLock::new();

/// A flag that can be claimed exactly once.
#[derive(Debug, Default)]
pub struct SessionLatch {
    fired: AtomicBool,
}

impl SessionLatch {
    /// Create an unclaimed latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// The latch shared by the whole process.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_LATCH.get_or_init(|| Arc::new(Self::new())))
    }

    /// Claims the latch. Returns true for the first caller only.
    pub fn try_acquire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true once the latch has been claimed.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Entries removed by one cleanup run, per cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired ephemeris entries removed.
    pub ephemeris: usize,
    /// Expired transit entries removed.
    pub transit: usize,
    /// Expired interpretation entries removed.
    pub interpretation: usize,
}

impl CleanupReport {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.ephemeris + self.transit + self.interpretation
    }
}

/// Sweeps the three caches at most once per session.
#[derive(Debug)]
pub struct CleanupOrchestrator {
    ephemeris: Arc<dyn ExpiringCache>,
    transit: Arc<dyn ExpiringCache>,
    interpretation: Arc<dyn ExpiringCache>,
    latch: Arc<SessionLatch>,
}

impl CleanupOrchestrator {
    /// Create an orchestrator gated by the process-wide latch.
    #[must_use]
    pub fn new(
        ephemeris: Arc<dyn ExpiringCache>,
        transit: Arc<dyn ExpiringCache>,
        interpretation: Arc<dyn ExpiringCache>,
    ) -> Self {
        Self {
            ephemeris,
            transit,
            interpretation,
            latch: SessionLatch::global(),
        }
    }

    /// Gate runs with `latch` instead of the process-wide one.
    #[must_use]
    pub fn with_latch(mut self, latch: Arc<SessionLatch>) -> Self {
        self.latch = latch;
        self
    }

    /// Returns the latch gating [`run_once`](Self::run_once).
    #[must_use]
    pub fn latch(&self) -> &SessionLatch {
        &self.latch
    }

    /// Sweeps every cache concurrently, the first time it is called.
    ///
    /// Later calls return `None` without touching any store.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Option<CleanupReport> {
        if !self.latch.try_acquire() {
            debug!("Cleanup already ran this session");
            return None;
        }

        let (ephemeris, transit, interpretation) = tokio::join!(
            self.ephemeris.sweep_expired(),
            self.transit.sweep_expired(),
            self.interpretation.sweep_expired(),
        );
        let report = CleanupReport {
            ephemeris,
            transit,
            interpretation,
        };

        if report.total() > 0 {
            info!(
                ephemeris,
                transit,
                interpretation,
                total = report.total(),
                "Removed expired cache entries"
            );
        }
        Some(report)
    }

    /// Runs [`run_once`](Self::run_once) on a background task.
    pub fn spawn_run_once(self: Arc<Self>) -> JoinHandle<Option<CleanupReport>> {
        tokio::spawn(async move { self.run_once().await })
    }

    /// Clears every cache concurrently. Not gated by the latch.
    ///
    /// # Errors
    /// Returns the first failure after every clear has finished.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<()> {
        let caches = [&self.ephemeris, &self.transit, &self.interpretation];
        let (a, b, c) = tokio::join!(caches[0].clear(), caches[1].clear(), caches[2].clear());

        let mut first_error = None;
        for (cache, result) in caches.iter().zip([a, b, c]) {
            if let Err(e) = result {
                warn!(cache = cache.name(), error = %e, "Failed to clear cache");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Cleared all caches");
                Ok(())
            }
        }
    }
}
