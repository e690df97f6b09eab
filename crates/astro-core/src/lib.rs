#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/astro/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the chart data caches.
//!
//! This crate provides the foundational abstractions shared by the stores and
//! the caches:
//!
//! - [`EntryStore`](store::EntryStore) - Keyed store indexed by write time
//! - [`StoredEntry`](store::StoredEntry) - The record every cache persists
//! - [`Clock`](clock::Clock) - Time source for freshness checks
//! - [`EphemerisSource`](source::EphemerisSource) - Remote ephemeris computation
//! - [`TransitSource`](source::TransitSource) - Remote transit computation
//! - [`CacheError`](error::CacheError) - Error type

/// Time source abstraction.
pub mod clock;
/// Error types for cache operations.
pub mod error;
/// Remote collaborator traits.
pub mod source;
/// Storage trait and record type.
pub mod store;
/// Core data types (months, ephemeris rows, transit rows, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use clock::{Clock, ManualClock, SystemClock, duration_ms};
pub use error::{CacheError, Result};
pub use source::{ChartSource, EphemerisSource, TextStream, TransitSource};
pub use store::{EntryStore, StoredEntry};
pub use types::{
    AspectKind, ChartId, EphemerisDay, InterpretationEntry, Planet, PlanetPosition, SubjectId,
    TransitAspect, TransitDay, YearMonth,
};
