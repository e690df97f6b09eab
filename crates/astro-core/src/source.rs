//! Collaborator traits for the remote services the caches sit in front of.
//!
//! This module defines the traits the cache layer consumes but never implements:
//!
//! - [`ChartSource`] - Base trait for every remote collaborator
//! - [`EphemerisSource`] - Daily planetary positions for a date range
//! - [`TransitSource`] - Day-by-day transits for a subject and month
//! - [`TextStream`] - Incremental output of the AI text-generation transport

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use crate::{
    error::Result,
    types::{EphemerisDay, SubjectId, TransitDay, YearMonth},
};

/// A finite, non-restartable sequence of text increments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Base trait for all remote collaborators.
pub trait ChartSource: Send + Sync + Debug {
    /// Returns the name of this source (e.g. "chart-api").
    fn name(&self) -> &str;
}

/// Remote ephemeris computation.
///
/// Only invoked on a cache miss.
#[async_trait]
pub trait EphemerisSource: ChartSource {
    /// Computes daily planetary positions for every day in `start..=end`.
    async fn fetch_ephemeris(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EphemerisDay>>;
}

/// Remote transit computation.
///
/// Only invoked on a cache miss.
#[async_trait]
pub trait TransitSource: ChartSource {
    /// Computes transits against `subject`'s natal chart for every day of `month`.
    async fn fetch_transits(&self, subject: &SubjectId, month: YearMonth)
    -> Result<Vec<TransitDay>>;
}
