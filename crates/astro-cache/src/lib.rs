#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/astro/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Persistent caches for chart data.
//!
//! Three independent caches sit in front of the remote chart services, each
//! backed by its own [`EntryStore`](astro_core::EntryStore):
//!
//! - [`EphemerisCache`] - Ephemeris tables keyed by date range
//! - [`TransitCache`] - Monthly transits keyed by subject and month
//! - [`InterpretationCache`] - Progressively written interpretation text
//!
//! [`write_with_recovery`] handles writes that run out of space, and
//! [`CleanupOrchestrator`] sweeps expired entries once per session.
//!
//! # Example
//!
//! ```rust,ignore
//! use astro_cache::{CacheConfig, ChartCaches};
//! use astro_core::SystemClock;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> astro_core::Result<()> {
//!     let config = CacheConfig::from_json_str(r#"{ "directory": "/var/cache/astro" }"#)?;
//!     let caches = ChartCaches::from_config(&config, Arc::new(SystemClock));
//!     Arc::new(caches.orchestrator()).spawn_run_once();
//!
//!     let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!     let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//!     if let Some(days) = caches.ephemeris.get(start, end).await {
//!         println!("{} cached days", days.len());
//!     }
//!     Ok(())
//! }
//! ```

/// The three caches built from one configuration.
pub mod caches;
/// Once-per-session cleanup.
pub mod cleanup;
/// Cache configuration.
pub mod config;
/// Ephemeris cache.
pub mod ephemeris;
mod freshness;
/// Interpretation cache.
pub mod interpretation;
/// Storage quota recovery.
pub mod quota;
/// Read-through chart data service.
pub mod service;
/// Transit cache.
pub mod transit;

#[cfg(test)]
mod testing;

pub use caches::ChartCaches;
pub use cleanup::{CleanupOrchestrator, CleanupReport, ExpiringCache, SessionLatch};
pub use config::{CacheConfig, StoreKind};
pub use ephemeris::{DEFAULT_EPHEMERIS_TTL, EPHEMERIS_SCHEMA_VERSION, EphemerisCache, ephemeris_key};
pub use interpretation::{INTERPRETATION_SCHEMA_VERSION, InterpretationCache};
pub use quota::{QuotaPolicy, is_quota_exceeded, write_with_recovery};
pub use service::ChartDataService;
pub use transit::{DEFAULT_TRANSIT_TTL, TRANSIT_SCHEMA_VERSION, TransitCache, transit_key};
