//! Lazily opened, memoized store handles.

use astro_core::{EntryStore, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{InMemoryStore, NoopStore};

type Opener = Box<dyn Fn() -> Result<Arc<dyn EntryStore>> + Send + Sync>;

/// Handle to one store, opened on first use.
///
/// Repeated calls to [`open`](Self::open) return the same live store. A failed
/// open is not remembered, so the next call tries again.
pub struct StoreHandle {
    name: String,
    opener: Opener,
    cell: OnceCell<Arc<dyn EntryStore>>,
    opens: AtomicUsize,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl StoreHandle {
    /// Create a handle that runs `opener` the first time the store is needed.
    pub fn new<F>(name: impl Into<String>, opener: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EntryStore>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            opener: Box::new(opener),
            cell: OnceCell::new(),
            opens: AtomicUsize::new(0),
        }
    }

    /// Wrap a store that is already open.
    #[must_use]
    pub fn from_store(store: Arc<dyn EntryStore>) -> Self {
        let name = store.name().to_string();
        let fallback = Arc::clone(&store);
        Self {
            name,
            opener: Box::new(move || Ok(Arc::clone(&fallback))),
            cell: OnceCell::new_with(Some(store)),
            opens: AtomicUsize::new(0),
        }
    }

    /// Handle to a fresh [`InMemoryStore`].
    #[must_use]
    pub fn memory(name: impl Into<String>) -> Self {
        Self::from_store(Arc::new(InMemoryStore::new(name)))
    }

    /// Handle to a [`NoopStore`].
    #[must_use]
    pub fn noop(name: impl Into<String>) -> Self {
        Self::from_store(Arc::new(NoopStore::new(name)))
    }

    /// Handle to a [`SqliteStore`](crate::SqliteStore) at `path`, opened lazily.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(
        name: impl Into<String>,
        path: impl Into<std::path::PathBuf>,
        options: crate::SqliteOptions,
    ) -> Self {
        let name = name.into();
        let path = path.into();
        let store_name = name.clone();
        Self::new(name, move || {
            let store = crate::SqliteStore::open(store_name.clone(), &path, options)?;
            Ok(Arc::new(store) as Arc<dyn EntryStore>)
        })
    }

    /// Handle to an in-memory [`SqliteStore`](crate::SqliteStore), opened lazily.
    #[cfg(feature = "sqlite")]
    pub fn sqlite_in_memory(name: impl Into<String>, options: crate::SqliteOptions) -> Self {
        let name = name.into();
        let store_name = name.clone();
        Self::new(name, move || {
            let store = crate::SqliteStore::in_memory(store_name.clone(), options)?;
            Ok(Arc::new(store) as Arc<dyn EntryStore>)
        })
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the store has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns how many times the opener has run.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Returns the live store, opening it on first use.
    ///
    /// # Errors
    /// Returns the opener's error; the next call retries the open.
    pub async fn open(&self) -> Result<Arc<dyn EntryStore>> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                self.opens.fetch_add(1, Ordering::SeqCst);
                debug!(store = %self.name, "Opening store");
                (self.opener)()
            })
            .await?;
        Ok(Arc::clone(store))
    }
}
