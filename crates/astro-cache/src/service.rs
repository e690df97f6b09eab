//! Read-through access to chart data with remote fallback.

use std::sync::Arc;

use astro_core::{
    CacheError, ChartId, EphemerisDay, EphemerisSource, InterpretationEntry, Result, SubjectId,
    TransitDay, TransitSource, YearMonth,
};
use chrono::NaiveDate;
use tracing::{debug, instrument, warn};

use crate::ChartCaches;

/// Serves chart data from the caches, falling back to remote sources on a miss.
///
/// Sources of each kind are tried in registration order until one succeeds.
/// A successful fetch is written back to the cache; a failed write-back only
/// logs.
///
/// # Example
///
/// ```rust,ignore
/// use astro_cache::{CacheConfig, ChartCaches, ChartDataService};
/// use astro_core::SystemClock;
/// use std::sync::Arc;
///
/// let caches = ChartCaches::from_config(&CacheConfig::default(), Arc::new(SystemClock));
/// let service = ChartDataService::new(caches).with_ephemeris_source(Arc::new(chart_api));
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
/// let days = service.ephemeris(start, end).await?;
/// ```
pub struct ChartDataService {
    caches: ChartCaches,
    ephemeris_sources: Vec<Arc<dyn EphemerisSource>>,
    transit_sources: Vec<Arc<dyn TransitSource>>,
}

impl std::fmt::Debug for ChartDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartDataService")
            .field(
                "ephemeris_sources",
                &self
                    .ephemeris_sources
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "transit_sources",
                &self
                    .transit_sources
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ChartDataService {
    /// Create a service with no remote sources.
    #[must_use]
    pub const fn new(caches: ChartCaches) -> Self {
        Self {
            caches,
            ephemeris_sources: Vec::new(),
            transit_sources: Vec::new(),
        }
    }

    /// Add an ephemeris source.
    #[must_use]
    pub fn with_ephemeris_source(mut self, source: Arc<dyn EphemerisSource>) -> Self {
        self.register_ephemeris(source);
        self
    }

    /// Add a transit source.
    #[must_use]
    pub fn with_transit_source(mut self, source: Arc<dyn TransitSource>) -> Self {
        self.register_transit(source);
        self
    }

    /// Register an ephemeris source.
    pub fn register_ephemeris(&mut self, source: Arc<dyn EphemerisSource>) {
        debug!(source = source.name(), "Registering ephemeris source");
        self.ephemeris_sources.push(source);
    }

    /// Register a transit source.
    pub fn register_transit(&mut self, source: Arc<dyn TransitSource>) {
        debug!(source = source.name(), "Registering transit source");
        self.transit_sources.push(source);
    }

    /// Returns the underlying caches.
    #[must_use]
    pub const fn caches(&self) -> &ChartCaches {
        &self.caches
    }

    /// Returns daily positions for `start..=end`.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidParameter`] for a reversed range,
    /// [`CacheError::SourceNotConfigured`] on a miss with no sources, or the
    /// last source error when every source fails.
    #[instrument(skip(self))]
    pub async fn ephemeris(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EphemerisDay>> {
        if start > end {
            return Err(CacheError::InvalidParameter(format!(
                "ephemeris range starts after it ends: {start} > {end}"
            )));
        }

        if let Some(days) = self.caches.ephemeris.get(start, end).await {
            return Ok(days);
        }

        if self.ephemeris_sources.is_empty() {
            return Err(CacheError::SourceNotConfigured(
                "No ephemeris sources registered".to_string(),
            ));
        }

        let mut last_error = None;
        for source in &self.ephemeris_sources {
            debug!(source = source.name(), "Fetching ephemeris");
            match source.fetch_ephemeris(start, end).await {
                Ok(days) => {
                    self.caches.ephemeris.set(start, end, &days).await;
                    return Ok(days);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CacheError::Other("All ephemeris sources failed".into())))
    }

    /// Returns the transits of `subject` for every day of `month`.
    ///
    /// # Errors
    /// Returns [`CacheError::SourceNotConfigured`] on a miss with no sources,
    /// or the last source error when every source fails.
    #[instrument(skip_all, fields(subject = %subject, month = %month))]
    pub async fn transits(&self, subject: &SubjectId, month: YearMonth) -> Result<Vec<TransitDay>> {
        if let Some(days) = self.caches.transit.get(subject, month).await {
            return Ok(days);
        }

        if self.transit_sources.is_empty() {
            return Err(CacheError::SourceNotConfigured(
                "No transit sources registered".to_string(),
            ));
        }

        let mut last_error = None;
        for source in &self.transit_sources {
            debug!(source = source.name(), "Fetching transits");
            match source.fetch_transits(subject, month).await {
                Ok(days) => {
                    self.caches.transit.set(subject, month, &days).await;
                    return Ok(days);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CacheError::Other("All transit sources failed".into())))
    }

    /// Returns the locally cached draft of an interpretation, if any.
    ///
    /// Callers fall back to the server record on `None`.
    pub async fn interpretation_draft(&self, chart_id: &ChartId) -> Option<InterpretationEntry> {
        self.caches.interpretation.get(chart_id).await
    }
}
