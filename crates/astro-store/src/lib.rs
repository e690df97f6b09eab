#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/astro/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Store backends for the chart data caches.
//!
//! This crate provides implementations of the [`EntryStore`] trait from `astro-core`:
//!
//! - [`SqliteStore`] - Persistent SQLite-based store (default, requires `sqlite` feature)
//! - [`InMemoryStore`] - In-memory store with an optional byte quota
//! - [`NoopStore`] - Store that doesn't keep anything
//!
//! and [`StoreHandle`], which opens a store lazily and hands out the same
//! instance on every later call.

/// Lazily opened store handles.
pub mod handle;
/// In-memory store implementation.
pub mod memory;
/// No-op store implementation.
pub mod noop;

/// SQLite-based store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use astro_core::EntryStore;

// Re-export implementations
pub use handle::StoreHandle;
pub use memory::InMemoryStore;
pub use noop::NoopStore;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteOptions, SqliteStore};
