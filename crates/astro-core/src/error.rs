//! Error types for cache operations.
//!
//! This module defines [`CacheError`] which covers every failure a cache store,
//! a remote collaborator, or the cache layer itself can report.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store hit its capacity ceiling while writing.
    #[error("Storage quota exceeded in {store}: {message}")]
    QuotaExceeded {
        /// Name of the store that rejected the write.
        store: String,
        /// Backend-specific description of the failure.
        message: String,
    },

    /// Any other failure of the underlying storage engine.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store has no timestamp index to enumerate entries by age.
    #[error("Store {0} has no timestamp index")]
    MissingIndex(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No remote collaborator is configured for the request.
    #[error("Source not configured: {0}")]
    SourceNotConfigured(String),

    /// A remote collaborator (ephemeris service, AI transport) failed.
    #[error("Source error: {0}")]
    Source(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl CacheError {
    /// Creates a [`CacheError::QuotaExceeded`] for the named store.
    pub fn quota_exceeded(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            store: store.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;
